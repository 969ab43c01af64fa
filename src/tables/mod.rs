//! Table assembly.
//!
//! Regression fragments written by the estimation step are cleaned in place,
//! then their interaction estimates are stacked into composite tables that
//! compare one axis at a time: filters, fixed-effect sets, or samples.

pub mod cleaner;
pub mod composite;
pub mod parser;
pub mod render;
pub mod row;
pub mod scanner;

use crate::config::Config;
use crate::error::Result;
use std::path::PathBuf;
use tracing::info;

/// Identifies one regression fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentKey {
    pub panel: String,
    pub sample: String,
    pub filter: String,
    /// Fixed-effect specification, for fragments of the fixed-effect grid.
    pub fe: Option<String>,
}

impl FragmentKey {
    pub fn new(panel: &str, sample: &str, filter: &str) -> Self {
        Self {
            panel: panel.to_string(),
            sample: sample.to_string(),
            filter: filter.to_string(),
            fe: None,
        }
    }

    pub fn with_fe(mut self, fe: &str) -> Self {
        self.fe = Some(fe.to_string());
        self
    }

    /// `<prefix>_<panel>_<sample>_<filter>[_<fe>].tex`
    pub fn file_name(&self, prefix: &str) -> String {
        match &self.fe {
            Some(fe) => format!(
                "{}_{}_{}_{}_{}.tex",
                prefix, self.panel, self.sample, self.filter, fe
            ),
            None => format!("{}_{}_{}_{}.tex", prefix, self.panel, self.sample, self.filter),
        }
    }
}

/// The comparison axis of a composite table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    /// One row per outlier filter, fixed sample.
    Filters,
    /// One row per fixed-effect specification, fixed sample and filter.
    FixedEffects,
    /// One row per sample, fixed filter.
    Robustness,
}

impl CompositeKind {
    /// Output file name. Arguments a kind does not vary over are ignored.
    pub fn file_name(&self, prefix: &str, panel: &str, sample: &str, filter: &str) -> String {
        match self {
            CompositeKind::Filters => format!("{}_{}_{}_composite.tex", prefix, panel, sample),
            CompositeKind::FixedEffects => format!(
                "{}_{}_{}_{}_FEcomposite.tex",
                prefix, panel, sample, filter
            ),
            CompositeKind::Robustness => format!("{}_{}_robustness_composite.tex", prefix, panel),
        }
    }

    /// Whether rows carry an observation count column.
    pub fn reports_observations(&self) -> bool {
        !matches!(self, CompositeKind::FixedEffects)
    }
}

/// Clean every fragment in the tables directory.
pub fn run_cleanup(config: &Config, show_progress: bool) -> Result<Vec<PathBuf>> {
    cleaner::clean_all(&config.paths.tables_dir, &config.tables, show_progress)
}

/// Build every composite: filter composites per sample and panel, then the
/// fixed-effect composite per panel, then the robustness composite per panel.
pub fn run_composites(config: &Config) -> Result<Vec<PathBuf>> {
    let dir = &config.paths.tables_dir;
    let tables = &config.tables;
    let mut written = Vec::new();

    for sample in &tables.filter_samples {
        for panel in &tables.panels {
            written.push(composite::build_filter_composite(dir, tables, sample, panel)?);
        }
    }
    for panel in &tables.panels {
        written.push(composite::build_fe_composite(
            dir,
            tables,
            &tables.fe_sample,
            &tables.fe_filter,
            panel,
        )?);
    }
    for panel in &tables.panels {
        written.push(composite::build_robustness_composite(dir, tables, panel)?);
    }

    info!(count = written.len(), "built composite tables");
    Ok(written)
}


#[cfg(test)]
mod tests {
    use super::test_support::write_raw;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fragment_key_file_name() {
        let key = FragmentKey::new("A", "full", "none");
        assert_eq!(key.file_name("t8"), "t8_A_full_none.tex");
        assert_eq!(
            key.with_fe("mainFE").file_name("t8"),
            "t8_A_full_none_mainFE.tex"
        );
    }

    #[test]
    fn test_composite_file_names() {
        assert_eq!(
            CompositeKind::Filters.file_name("t8", "A", "top25", "both"),
            "t8_A_top25_composite.tex"
        );
        assert_eq!(
            CompositeKind::FixedEffects.file_name("t8", "B", "full", "both"),
            "t8_B_full_both_FEcomposite.tex"
        );
        assert_eq!(
            CompositeKind::Robustness.file_name("t8", "A", "full", "both"),
            "t8_A_robustness_composite.tex"
        );
    }

    #[test]
    fn test_run_cleanup_then_composites() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.tables_dir = dir.path().to_path_buf();
        let tables = config.tables.clone();

        let vars_a = [r"d\_total\_deposits", r"d\_deposit\_spread"];
        let vars_b = [r"d\_total\_assets", r"d\_cash"];
        for (panel, vars) in [("A", &vars_a), ("B", &vars_b)] {
            for sample in &tables.filter_samples {
                for filter in &tables.filters {
                    let key = FragmentKey::new(panel, sample, &filter.tag);
                    write_raw(dir.path(), &key.file_name("t8"), vars.as_slice(), "-1.55512", true);
                }
            }
            for spec in &tables.fe_specs {
                let key = FragmentKey::new(panel, &tables.fe_sample, &tables.fe_filter)
                    .with_fe(&spec.tag);
                write_raw(dir.path(), &key.file_name("t8"), vars.as_slice(), "0.5", false);
            }
        }

        let cleaned = run_cleanup(&config, false).unwrap();
        assert_eq!(cleaned.len(), 2 * (4 * 4 + 6));

        let written = run_composites(&config).unwrap();
        assert_eq!(written.len(), 4 * 2 + 2 + 2);
        assert_eq!(written[0], dir.path().join("t8_A_full_composite.tex"));
        assert_eq!(written[8], dir.path().join("t8_A_full_both_FEcomposite.tex"));
        assert_eq!(written[11], dir.path().join("t8_B_robustness_composite.tex"));

        let robustness = fs::read_to_string(&written[10]).unwrap();
        assert!(robustness.contains(
            r"   Full sample & \makecell{-1.555 \\ (0.027)} & \makecell{-1.555 \\ (0.027)} & 4,848\\"
        ));
        let fe = fs::read_to_string(&written[9]).unwrap();
        assert!(fe.contains(r"\makecell[c]{$\Delta$Total\\assets}"));
        assert!(fe.contains(r"   Y & Y & Y & \makecell{0.500 \\ (0.027)}"));

        // Composites are left alone by a second cleanup pass.
        let again = run_cleanup(&config, false).unwrap();
        assert_eq!(again.len(), cleaned.len());
        assert_eq!(fs::read_to_string(&written[10]).unwrap(), robustness);
    }
}
