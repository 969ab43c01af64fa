//! Extraction of the interaction estimate from a regression fragment.
//!
//! A fragment is scanned line by line through a small state machine:
//! the header block sits between the first `\toprule` and the next
//! `\midrule`, and the interaction row follows somewhere in the body.

use super::row::extract_cells;
use crate::config::TablesConfig;
use crate::error::{PipelineError, Result};
use std::fs;
use std::path::Path;
use tracing::warn;

const TOPRULE: &str = r"\toprule";
const MIDRULE: &str = r"\midrule";

/// Where the scan currently is within a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Looking for `\toprule`, or collecting header lines until `\midrule`.
    SeekingHeader,
    /// Header block closed by `\midrule`.
    HeaderCaptured,
    /// Looking for the interaction row.
    SeekingTargetRow,
    /// Interaction row found; nothing more to scan.
    RowCaptured,
}

/// Data taken from one fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFragment {
    /// Dependent-variable headers, one per model column.
    pub header_vars: Vec<String>,
    /// Column number headers, e.g. `(1)`.
    pub header_nums: Vec<String>,
    /// Interaction coefficients.
    pub coefs: Vec<String>,
    /// Standard errors below the coefficients.
    pub ses: Vec<String>,
    /// Observation counts, when the fragment reports them.
    pub observations: Option<Vec<String>>,
}

impl ParsedFragment {
    /// First reported observation count, or an empty string.
    pub fn first_observation(&self) -> &str {
        self.observations
            .as_ref()
            .and_then(|obs| obs.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Whether the observation row reports different counts across columns.
    pub fn observations_vary(&self) -> bool {
        self.observations
            .as_ref()
            .is_some_and(|obs| obs.windows(2).any(|pair| pair[0] != pair[1]))
    }

    /// Coefficient and standard error stacked into one cell per column.
    pub fn stacked_cells(&self) -> Vec<String> {
        self.coefs
            .iter()
            .zip(&self.ses)
            .map(|(coef, se)| format!(r"\makecell{{{} \\ {}}}", coef, se))
            .collect()
    }
}

struct FragmentParser<'a> {
    tables: &'a TablesConfig,
    state: ScanState,
    in_header: bool,
    header: Vec<&'a str>,
    target: Option<usize>,
    fallback: Option<usize>,
}

impl<'a> FragmentParser<'a> {
    fn new(tables: &'a TablesConfig) -> Self {
        Self {
            tables,
            state: ScanState::SeekingHeader,
            in_header: false,
            header: Vec::new(),
            target: None,
            fallback: None,
        }
    }

    fn is_fallback_row(&self, line: &str) -> bool {
        self.tables.level_term.iter().any(|t| line.contains(t.as_str()))
            && self
                .tables
                .interaction_markers
                .iter()
                .any(|m| line.contains(m.as_str()))
    }

    fn step(&mut self, index: usize, line: &'a str) {
        match self.state {
            ScanState::SeekingHeader => {
                if !self.in_header {
                    self.in_header = line.contains(TOPRULE);
                } else if line.contains(MIDRULE) {
                    self.state = ScanState::HeaderCaptured;
                } else {
                    self.header.push(line);
                }
            }
            ScanState::HeaderCaptured => {
                self.state = ScanState::SeekingTargetRow;
                self.step(index, line);
            }
            ScanState::SeekingTargetRow => {
                if line.contains(self.tables.interaction_label.as_str()) {
                    self.target = Some(index);
                    self.state = ScanState::RowCaptured;
                } else if self.fallback.is_none() && self.is_fallback_row(line) {
                    self.fallback = Some(index);
                }
            }
            ScanState::RowCaptured => {}
        }
    }
}

/// Parse fragment text. `path` is only used in error messages.
pub fn parse_fragment(
    text: &str,
    path: &Path,
    tables: &TablesConfig,
    require_observations: bool,
) -> Result<ParsedFragment> {
    let missing = |target: &str| PipelineError::MissingMarker {
        path: path.to_path_buf(),
        target: target.to_string(),
    };

    let lines: Vec<&str> = text.lines().collect();
    let mut parser = FragmentParser::new(tables);
    for (index, line) in lines.iter().enumerate() {
        parser.step(index, line);
        if parser.state == ScanState::RowCaptured {
            break;
        }
    }

    if parser.state == ScanState::SeekingHeader {
        return Err(missing(if parser.in_header {
            "header end (\\midrule)"
        } else {
            "header start (\\toprule)"
        }));
    }
    if parser.header.len() < 2 {
        return Err(missing("header rows"));
    }

    let coef_index = match (parser.target, parser.fallback) {
        (Some(index), _) => index,
        (None, Some(index)) => {
            warn!(path = %path.display(), line = index, "interaction label not found, using fallback row");
            index
        }
        (None, None) => return Err(missing("interaction row")),
    };
    let se_index = lines
        .iter()
        .enumerate()
        .skip(coef_index + 1)
        .find(|(_, line)| line.contains('&'))
        .map(|(i, _)| i)
        .ok_or_else(|| missing("standard error row"))?;

    let observations = lines
        .iter()
        .find(|line| line.contains(tables.observations_label.as_str()))
        .map(|line| extract_cells(line, true));
    if require_observations && observations.is_none() {
        return Err(missing("observations row"));
    }

    let fragment = ParsedFragment {
        header_vars: extract_cells(parser.header[0], true),
        header_nums: extract_cells(parser.header[1], true),
        coefs: extract_cells(lines[coef_index], true),
        ses: extract_cells(lines[se_index], true),
        observations,
    };

    let width = fragment.header_vars.len();
    if fragment.coefs.len() != width || fragment.ses.len() != width {
        warn!(
            path = %path.display(),
            headers = width,
            coefs = fragment.coefs.len(),
            ses = fragment.ses.len(),
            "interaction row width differs from header"
        );
    }
    Ok(fragment)
}

/// Read and parse a fragment from disk.
pub fn read_fragment(
    path: &Path,
    tables: &TablesConfig,
    require_observations: bool,
) -> Result<ParsedFragment> {
    if !path.is_file() {
        return Err(PipelineError::MissingFragment(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    parse_fragment(&text, path, tables, require_observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const CLEANED: &str = r"\begingroup
\centering
\begin{tabular*}{\textwidth}{@{\extracolsep{\fill}}lccc@{}}
   \toprule
   & \makecell[c]{$\Delta$Total\\deposits} & \makecell[c]{$\Delta$Cash} & \makecell[c]{$\Delta$C\&I\\loans}\\
   & (1) & (2) & (3)\\
   \midrule
   $\Delta FF_t \times$ Bank HHI & -1.555 & -0.410 & 0.120\\
      & (0.027) & (0.031) & (0.008)\\
   \midrule
   Observations & 4,848 & 4,848 & 4,848\\
   \bottomrule
\end{tabular*}
\par\endgroup";

    fn path() -> PathBuf {
        PathBuf::from("t8_A_full_none.tex")
    }

    #[test]
    fn test_parse_cleaned_fragment() {
        let parsed = parse_fragment(CLEANED, &path(), &TablesConfig::default(), true).unwrap();
        assert_eq!(parsed.header_vars.len(), 3);
        assert_eq!(parsed.header_vars[2], r"\makecell[c]{$\Delta$C\&I\\loans}");
        assert_eq!(parsed.header_nums, vec!["(1)", "(2)", "(3)"]);
        assert_eq!(parsed.coefs, vec!["-1.555", "-0.410", "0.120"]);
        assert_eq!(parsed.ses, vec!["(0.027)", "(0.031)", "(0.008)"]);
        assert_eq!(parsed.first_observation(), "4,848");
        assert_eq!(parsed.stacked_cells()[0], r"\makecell{-1.555 \\ (0.027)}");
    }

    #[test]
    fn test_fallback_interaction_row() {
        let text = CLEANED.replace(r"$\Delta FF_t \times$ Bank HHI", r"l1\_herfdepcty $\times$ dFF");
        let parsed = parse_fragment(&text, &path(), &TablesConfig::default(), true).unwrap();
        assert_eq!(parsed.coefs[0], "-1.555");
        assert_eq!(parsed.ses[0], "(0.027)");
    }

    #[test]
    fn test_level_term_alone_is_not_interaction() {
        let text = CLEANED.replace(r"$\Delta FF_t \times$ Bank HHI", r"l1\_herfdepcty");
        let err = parse_fragment(&text, &path(), &TablesConfig::default(), true).unwrap_err();
        match err {
            PipelineError::MissingMarker { target, .. } => assert_eq!(target, "interaction row"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_header() {
        let text = CLEANED.replace(r"\toprule", "");
        let err = parse_fragment(&text, &path(), &TablesConfig::default(), true).unwrap_err();
        assert!(matches!(err, PipelineError::MissingMarker { .. }));
    }

    fn missing_target(err: PipelineError) -> String {
        match err {
            PipelineError::MissingMarker { path: found, target } => {
                assert_eq!(found, path());
                target
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unclosed_header() {
        let text = CLEANED.replace(r"\midrule", "");
        let err = parse_fragment(&text, &path(), &TablesConfig::default(), true).unwrap_err();
        assert_eq!(missing_target(err), r"header end (\midrule)");
    }

    #[test]
    fn test_single_header_row() {
        let numbers = format!("{}\n", r"   & (1) & (2) & (3)\\");
        let text = CLEANED.replace(&numbers, "");
        assert_ne!(text, CLEANED);
        let err = parse_fragment(&text, &path(), &TablesConfig::default(), true).unwrap_err();
        assert_eq!(missing_target(err), "header rows");
    }

    #[test]
    fn test_interaction_row_without_standard_errors() {
        let text = CLEANED
            .lines()
            .take_while(|line| !line.contains("(0.027)"))
            .collect::<Vec<_>>()
            .join("\n");
        let err = parse_fragment(&text, &path(), &TablesConfig::default(), false).unwrap_err();
        assert_eq!(missing_target(err), "standard error row");
    }

    #[test]
    fn test_observations_vary() {
        let parsed = parse_fragment(CLEANED, &path(), &TablesConfig::default(), true).unwrap();
        assert!(!parsed.observations_vary());

        let text = CLEANED.replace("& 4,848 & 4,848 & 4,848", "& 4,848 & 4,790 & 4,848");
        let parsed = parse_fragment(&text, &path(), &TablesConfig::default(), true).unwrap();
        assert!(parsed.observations_vary());
        assert_eq!(parsed.first_observation(), "4,848");
    }

    #[test]
    fn test_observations_optional() {
        let text = CLEANED.replace("Observations", "Obs");
        let tables = TablesConfig::default();

        let parsed = parse_fragment(&text, &path(), &tables, false).unwrap();
        assert_eq!(parsed.observations, None);
        assert_eq!(parsed.first_observation(), "");

        let err = parse_fragment(&text, &path(), &tables, true).unwrap_err();
        assert!(err.to_string().contains("observations row"));
    }

    #[test]
    fn test_missing_file() {
        let err = read_fragment(
            Path::new("/nonexistent/t8_A_full_none.tex"),
            &TablesConfig::default(),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::MissingFragment(_)));
    }
}
