//! Normalization of raw regression fragments.

use super::scanner::FragmentScanner;
use crate::config::{Replacement, TablesConfig};
use crate::error::{PipelineError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::{Captures, Regex};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const TABULAR_END: &str = r"\end{tabular}";
const WIDE_TABULAR_END: &str = r"\end{tabular*}";
const WIDE_TABULAR_BEGIN: &str = r"\begin{tabular*}{\textwidth}{@{\extracolsep{\fill}}";
const WIDE_TABULAR_CLOSE: &str = "@{}}";

/// Byte offset of the brace closing a group whose `{` was just consumed.
fn closing_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn apply(text: String, replacements: &[Replacement]) -> String {
    replacements
        .iter()
        .fold(text, |acc, r| acc.replace(r.from.as_str(), r.to.as_str()))
}

/// Rewrites fragments into their display form.
pub struct FragmentCleaner<'a> {
    tables: &'a TablesConfig,
    decimal: Regex,
    tabular: Regex,
}

impl<'a> FragmentCleaner<'a> {
    pub fn new(tables: &'a TablesConfig) -> Result<Self> {
        Ok(Self {
            tables,
            decimal: Regex::new(r"-?\d+\.\d+")?,
            tabular: Regex::new(r"\\begin\{tabular\}\{")?,
        })
    }

    /// Level term without the interaction, fit statistics and fixed-effect
    /// indicator rows are dropped.
    fn drop_rows(&self, text: &str) -> String {
        let tables = self.tables;
        let mut kept = Vec::new();
        let mut lines = text.lines();

        while let Some(line) = lines.next() {
            let level_only = tables.level_term.iter().any(|t| line.contains(t.as_str()))
                && !tables
                    .interaction_markers
                    .iter()
                    .any(|m| line.contains(m.as_str()));
            if level_only {
                // Its standard error row goes with it.
                lines.next();
                continue;
            }
            if tables.fit_rows.iter().any(|f| line.contains(f.as_str())) {
                continue;
            }
            if tables.fe_labels.iter().any(|fe| line.contains(fe.from.as_str())) {
                continue;
            }
            kept.push(line);
        }

        kept.join("\n")
    }

    /// Rewrite each `tabular` opening as a full-width `tabular*`, keeping the
    /// column spec intact even when it contains braced groups.
    fn widen(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 64);
        let mut rest = text;

        while let Some(m) = self.tabular.find(rest) {
            let spec = &rest[m.end()..];
            let Some(len) = closing_brace(spec) else {
                break;
            };
            out.push_str(&rest[..m.start()]);
            out.push_str(WIDE_TABULAR_BEGIN);
            out.push_str(&spec[..len]);
            out.push_str(WIDE_TABULAR_CLOSE);
            rest = &spec[len + 1..];
        }

        out.push_str(rest);
        out
    }

    /// Clean one fragment's text. Cleaning cleaned text is a no-op.
    pub fn clean(&self, text: &str, headers: &[Replacement]) -> String {
        let tables = self.tables;
        let text = self.drop_rows(text);
        let text = apply(text, headers);
        let text = apply(text, &tables.fe_labels);
        let text = text.replace(tables.raw_interaction.as_str(), tables.interaction_label.as_str());

        let text = self.widen(&text).replace(TABULAR_END, WIDE_TABULAR_END);

        self.decimal
            .replace_all(&text, |caps: &Captures| {
                caps[0]
                    .parse::<f64>()
                    .map(|v| format!("{:.3}", v))
                    .unwrap_or_else(|_| caps[0].to_string())
            })
            .into_owned()
    }

    /// Clean a fragment file in place.
    pub fn clean_file(&self, path: &Path, headers: &[Replacement]) -> Result<()> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let cleaned = self.clean(&text, headers);
        fs::write(path, cleaned).map_err(|e| PipelineError::io(path, e))?;
        debug!(path = %path.display(), "cleaned fragment");
        Ok(())
    }
}

/// Clean one fragment's text with the given header relabels.
#[cfg(test)]
pub fn clean_fragment(text: &str, headers: &[Replacement], tables: &TablesConfig) -> Result<String> {
    Ok(FragmentCleaner::new(tables)?.clean(text, headers))
}

/// Clean every fragment in `dir`. Returns the cleaned paths.
pub fn clean_all(dir: &Path, tables: &TablesConfig, show_progress: bool) -> Result<Vec<PathBuf>> {
    let fragments = FragmentScanner::new(dir, tables).scan()?;
    let cleaner = FragmentCleaner::new(tables)?;

    let progress_bar = if show_progress {
        let pb = ProgressBar::new(fragments.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut cleaned = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        if let Some(ref pb) = progress_bar {
            pb.set_message(
                fragment
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
        }
        if let Some(headers) = tables.headers_for(&fragment.panel) {
            cleaner.clean_file(&fragment.path, headers)?;
            cleaned.push(fragment.path);
        }
        if let Some(ref pb) = progress_bar {
            pb.inc(1);
        }
    }
    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    info!(dir = %dir.display(), count = cleaned.len(), "cleaned fragments");
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RAW: &str = r"\begingroup
\centering
\begin{tabular}{lcc}
   \toprule
   & d\_total\_deposits & d\_deposit\_spread\\
   & (1) & (2)\\
   \midrule
   l1\_herfdepcty & 0.0123456 & -0.2\\
      & (0.0041) & (0.051)\\
   l1\_herfdepcty $\times$ dFF & -1.55512 & -0.41\\
      & (0.02691) & (0.0307)\\
   \midrule
   rssdid fixed effects & Yes & Yes\\
   dateq fixed effects & Yes & Yes\\
   \midrule
   Observations & 4,848 & 4,848\\
   R$^2$ & 0.21034 & 0.1\\
   Within R$^2$ & 0.0123 & 0.01\\
   \bottomrule
\end{tabular}
\par\endgroup
";

    fn clean(text: &str) -> String {
        let tables = TablesConfig::default();
        let headers = tables.headers_for("A").unwrap().to_vec();
        clean_fragment(text, &headers, &tables).unwrap()
    }

    #[test]
    fn test_clean_fragment() {
        let cleaned = clean(RAW);

        assert!(cleaned.contains(
            r"\begin{tabular*}{\textwidth}{@{\extracolsep{\fill}}lcc@{}}"
        ));
        assert!(cleaned.contains(r"\end{tabular*}"));
        assert!(cleaned.contains(
            r"& \makecell[c]{$\Delta$Total\\deposits} & \makecell[c]{$\Delta$Deposit\\spread}\\"
        ));
        assert!(cleaned.contains(r"$\Delta FF_t \times$ Bank HHI & -1.555 & -0.410\\"));
        assert!(cleaned.contains("& (0.027) & (0.031)"));
        assert!(cleaned.contains("R$^2$ & 0.210 & 0.100"));

        assert!(!cleaned.contains("0.0123456"));
        assert!(!cleaned.contains("(0.004)"));
        assert!(!cleaned.contains("fixed effects"));
        assert!(!cleaned.contains("Within"));
        assert!(cleaned.contains("Observations & 4,848 & 4,848"));
    }

    #[test]
    fn test_clean_fragment_idempotent() {
        let once = clean(RAW);
        let twice = clean(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_negative_zero_is_stable() {
        let once = clean(r"x & -0.0004\\");
        assert_eq!(once, r"x & -0.000\\");
        assert_eq!(clean(&once), once);
    }

    #[test]
    fn test_widen_keeps_braced_column_specs() {
        let cleaned = clean("\\begin{tabular}{@{}lcc@{}}\n\\end{tabular}");
        assert_eq!(
            cleaned,
            "\\begin{tabular*}{\\textwidth}{@{\\extracolsep{\\fill}}@{}lcc@{}@{}}\n\\end{tabular*}"
        );

        let cleaned = clean(r"\begin{tabular}{l*{3}{c}p{3cm}}");
        assert_eq!(
            cleaned,
            r"\begin{tabular*}{\textwidth}{@{\extracolsep{\fill}}l*{3}{c}p{3cm}@{}}"
        );
        assert_eq!(clean(&cleaned), cleaned);
    }

    #[test]
    fn test_widen_leaves_unclosed_spec() {
        let text = r"\begin{tabular}{l{c";
        assert_eq!(clean(text), text);
    }

    #[test]
    fn test_clean_all() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("t8_A_full_none.tex"), RAW).unwrap();
        fs::write(dir.path().join("t8_A_full_composite.tex"), RAW).unwrap();

        let tables = TablesConfig::default();
        let cleaned = clean_all(dir.path(), &tables, false).unwrap();

        assert_eq!(cleaned, vec![dir.path().join("t8_A_full_none.tex")]);
        let fragment = fs::read_to_string(dir.path().join("t8_A_full_none.tex")).unwrap();
        assert!(fragment.contains(r"\begin{tabular*}"));
        let composite = fs::read_to_string(dir.path().join("t8_A_full_composite.tex")).unwrap();
        assert_eq!(composite, RAW);
    }
}
