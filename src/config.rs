//! Configuration file handling.
//!
//! This module handles loading the `.callpanel.toml` file and merging
//! command-line overrides into it. Every path and lookup table used by the
//! pipelines lives here; nothing else in the crate holds global state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".callpanel.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input and output locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Sample definition for the panel.
    #[serde(default)]
    pub sample: SampleConfig,

    /// Column lists for the panel.
    #[serde(default)]
    pub variables: VariablesConfig,

    /// Table cleanup and composite layout.
    #[serde(default)]
    pub tables: TablesConfig,
}

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Raw call-report records (Parquet).
    #[serde(default = "default_records")]
    pub records: PathBuf,

    /// Deposit-market concentration index (CSV).
    #[serde(default = "default_concentration")]
    pub concentration: PathBuf,

    /// Policy target rate series, published until the switch to a range.
    #[serde(default = "default_policy_target")]
    pub policy_target: PathBuf,

    /// Lower bound of the target range.
    #[serde(default = "default_policy_lower")]
    pub policy_lower: PathBuf,

    /// Upper bound of the target range.
    #[serde(default = "default_policy_upper")]
    pub policy_upper: PathBuf,

    /// Regression-ready output dataset.
    #[serde(default = "default_regression_data")]
    pub regression_data: PathBuf,

    /// JSON list of integer-convertible columns.
    #[serde(default = "default_diagnostics")]
    pub diagnostics: PathBuf,

    /// Quarterly policy rate written alongside the panel.
    #[serde(default = "default_policy_quarterly")]
    pub policy_quarterly: PathBuf,

    /// Directory holding the regression table fragments.
    #[serde(default = "default_tables_dir")]
    pub tables_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            records: default_records(),
            concentration: default_concentration(),
            policy_target: default_policy_target(),
            policy_lower: default_policy_lower(),
            policy_upper: default_policy_upper(),
            regression_data: default_regression_data(),
            diagnostics: default_diagnostics(),
            policy_quarterly: default_policy_quarterly(),
            tables_dir: default_tables_dir(),
        }
    }
}

fn default_records() -> PathBuf {
    PathBuf::from("data/raw/callreports_1976_2020.parquet")
}

fn default_concentration() -> PathBuf {
    PathBuf::from("data/raw/l1_herfdepcty.csv")
}

fn default_policy_target() -> PathBuf {
    PathBuf::from("data/raw/DFEDTAR.csv")
}

fn default_policy_lower() -> PathBuf {
    PathBuf::from("data/raw/DFEDTARL.csv")
}

fn default_policy_upper() -> PathBuf {
    PathBuf::from("data/raw/DFEDTARU.csv")
}

fn default_regression_data() -> PathBuf {
    PathBuf::from("data/processed/regression_data.csv")
}

fn default_diagnostics() -> PathBuf {
    PathBuf::from("data/processed/int_convertible_columns.json")
}

fn default_policy_quarterly() -> PathBuf {
    PathBuf::from("data/processed/fed_funds_rate_quarterly.csv")
}

fn default_tables_dir() -> PathBuf {
    PathBuf::from("tables")
}

/// A known-bad certificate id, keyed by the bank's primary id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertFix {
    pub rssdid: i64,
    pub cert: i64,
}

/// Sample restrictions and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Institutional type kept in the panel.
    #[serde(default = "default_charter_type")]
    pub charter_type: f64,

    /// Certificate corrections applied before merging.
    #[serde(default = "default_cert_fixes")]
    pub cert_fixes: Vec<CertFix>,

    /// Working sample, wider than the final window so differences exist
    /// at the edges.
    #[serde(default = "default_first_year")]
    pub first_year: i32,

    #[serde(default = "default_last_year")]
    pub last_year: i32,

    /// Final regression window.
    #[serde(default = "default_final_first_year")]
    pub final_first_year: i32,

    #[serde(default = "default_final_last_year")]
    pub final_last_year: i32,

    /// First year flagged by the post-cutoff indicator.
    #[serde(default = "default_post_cutoff_year")]
    pub post_cutoff_year: i32,

    /// Quarter-over-quarter asset growth that marks a high-growth quarter.
    #[serde(default = "default_growth_threshold")]
    pub growth_threshold: f64,

    /// Percentile cutoff for the top-25% size tier.
    #[serde(default = "default_top_quantile_wide")]
    pub top_quantile_wide: f64,

    /// Percentile cutoff for the top-10% size tier.
    #[serde(default = "default_top_quantile_narrow")]
    pub top_quantile_narrow: f64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            charter_type: default_charter_type(),
            cert_fixes: default_cert_fixes(),
            first_year: default_first_year(),
            last_year: default_last_year(),
            final_first_year: default_final_first_year(),
            final_last_year: default_final_last_year(),
            post_cutoff_year: default_post_cutoff_year(),
            growth_threshold: default_growth_threshold(),
            top_quantile_wide: default_top_quantile_wide(),
            top_quantile_narrow: default_top_quantile_narrow(),
        }
    }
}

fn default_charter_type() -> f64 {
    200.0
}

fn default_cert_fixes() -> Vec<CertFix> {
    vec![CertFix {
        rssdid: 3637685,
        cert: 58647,
    }]
}

fn default_first_year() -> i32 {
    1993
}

fn default_last_year() -> i32 {
    2014
}

fn default_final_first_year() -> i32 {
    1994
}

fn default_final_last_year() -> i32 {
    2013
}

fn default_post_cutoff_year() -> i32 {
    2009
}

fn default_growth_threshold() -> f64 {
    1.0
}

fn default_top_quantile_wide() -> f64 {
    0.75
}

fn default_top_quantile_narrow() -> f64 {
    0.90
}

/// A `from → to` text substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

impl Replacement {
    fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Column selection for the panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariablesConfig {
    /// Columns read from the raw records.
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,

    /// Raw names renamed to their analysis names.
    #[serde(default = "default_renames")]
    pub renames: Vec<Replacement>,

    /// Variables replaced by their within-bank log difference.
    #[serde(default = "default_log_variables")]
    pub log_variables: Vec<String>,

    /// Name of the concentration measure in the auxiliary file.
    #[serde(default = "default_concentration_column")]
    pub concentration_column: String,
}

impl Default for VariablesConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            renames: default_renames(),
            log_variables: default_log_variables(),
            concentration_column: default_concentration_column(),
        }
    }
}

fn default_columns() -> Vec<String> {
    vec![
        "rssdid",
        "cert",
        "bhcid",
        "name",
        "chartertype",
        "dateq",
        "year",
        "quarter",
        "assets",
        "liabilities",
        "deposits",
        "intexpdomdep",
        "savdep",
        "timedep",
        "cash",
        "securities",
        "loans",
        "reloans",
        "ciloans",
        "fedfundsrepoliab",
        "timedepge100k",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_renames() -> Vec<Replacement> {
    vec![
        Replacement::new("deposits", "total_deposits"),
        Replacement::new("savdep", "savings_deposits"),
        Replacement::new("timedep", "time_deposits"),
        Replacement::new("liabilities", "total_liabilities"),
        Replacement::new("assets", "total_assets"),
        Replacement::new("securities", "total_securities"),
        Replacement::new("loans", "total_loans"),
        Replacement::new("reloans", "re_loans"),
        Replacement::new("ciloans", "ci_loans"),
    ]
}

fn default_log_variables() -> Vec<String> {
    vec![
        // Panel A
        "total_deposits",
        "savings_deposits",
        "time_deposits",
        "total_liabilities",
        "wholesale_funding",
        // Panel B
        "total_assets",
        "cash",
        "total_securities",
        "total_loans",
        "re_loans",
        "ci_loans",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_concentration_column() -> String {
    "l1_herfdepcty".to_string()
}

/// A tagged axis value with its display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisLabel {
    pub tag: String,
    pub label: String,
}

impl AxisLabel {
    fn new(tag: &str, label: &str) -> Self {
        Self {
            tag: tag.to_string(),
            label: label.to_string(),
        }
    }
}

/// A fixed-effect specification and which groups it includes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeSpec {
    pub tag: String,
    pub bank: bool,
    pub quarter: bool,
    pub post: bool,
}

impl FeSpec {
    fn new(tag: &str, bank: bool, quarter: bool, post: bool) -> Self {
        Self {
            tag: tag.to_string(),
            bank,
            quarter,
            post,
        }
    }
}

/// Header relabels for one panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelHeaders {
    pub panel: String,
    pub replacements: Vec<Replacement>,
}

/// Table cleanup and composite settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesConfig {
    /// File name prefix shared by fragments and composites.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Panels built for every composite.
    #[serde(default = "default_panels")]
    pub panels: Vec<String>,

    /// Display label of the interaction row.
    #[serde(default = "default_interaction_label")]
    pub interaction_label: String,

    /// Raw spellings of the level term.
    #[serde(default = "default_level_term")]
    pub level_term: Vec<String>,

    /// Raw spellings of the policy-rate change inside an interaction label.
    #[serde(default = "default_interaction_markers")]
    pub interaction_markers: Vec<String>,

    /// Raw interaction row label, relabeled to `interaction_label`.
    #[serde(default = "default_raw_interaction")]
    pub raw_interaction: String,

    /// Substring identifying the observations row.
    #[serde(default = "default_observations_label")]
    pub observations_label: String,

    /// Substrings identifying goodness-of-fit rows to drop.
    #[serde(default = "default_fit_rows")]
    pub fit_rows: Vec<String>,

    /// Column header relabels per panel.
    #[serde(default = "default_headers")]
    pub headers: Vec<PanelHeaders>,

    /// Fixed-effect row labels and their short display form.
    #[serde(default = "default_fe_labels")]
    pub fe_labels: Vec<Replacement>,

    /// Filters stacked in the filter composite.
    #[serde(default = "default_filters")]
    pub filters: Vec<AxisLabel>,

    /// Samples that each get a filter composite.
    #[serde(default = "default_filter_samples")]
    pub filter_samples: Vec<String>,

    /// Samples stacked in the robustness composite.
    #[serde(default = "default_robust_samples")]
    pub robust_samples: Vec<AxisLabel>,

    /// Filter held fixed in the robustness composite.
    #[serde(default = "default_combined_filter")]
    pub robust_filter: String,

    /// Sample held fixed in the fixed-effect composite.
    #[serde(default = "default_fe_sample")]
    pub fe_sample: String,

    /// Filter held fixed in the fixed-effect composite.
    #[serde(default = "default_combined_filter")]
    pub fe_filter: String,

    /// Fixed-effect specifications stacked in the fixed-effect composite.
    #[serde(default = "default_fe_specs")]
    pub fe_specs: Vec<FeSpec>,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            panels: default_panels(),
            interaction_label: default_interaction_label(),
            level_term: default_level_term(),
            interaction_markers: default_interaction_markers(),
            raw_interaction: default_raw_interaction(),
            observations_label: default_observations_label(),
            fit_rows: default_fit_rows(),
            headers: default_headers(),
            fe_labels: default_fe_labels(),
            filters: default_filters(),
            filter_samples: default_filter_samples(),
            robust_samples: default_robust_samples(),
            robust_filter: default_combined_filter(),
            fe_sample: default_fe_sample(),
            fe_filter: default_combined_filter(),
            fe_specs: default_fe_specs(),
        }
    }
}

impl TablesConfig {
    /// Header relabels for a panel, if the panel is known.
    pub fn headers_for(&self, panel: &str) -> Option<&[Replacement]> {
        self.headers
            .iter()
            .find(|h| h.panel == panel)
            .map(|h| h.replacements.as_slice())
    }
}

fn default_prefix() -> String {
    "t8".to_string()
}

fn default_panels() -> Vec<String> {
    vec!["A".to_string(), "B".to_string()]
}

fn default_interaction_label() -> String {
    r"$\Delta FF_t \times$ Bank HHI".to_string()
}

fn default_level_term() -> Vec<String> {
    vec![r"l1\_herfdepcty".to_string(), "l1_herfdepcty".to_string()]
}

fn default_interaction_markers() -> Vec<String> {
    vec![
        "dFF".to_string(),
        "d_FF".to_string(),
        " x dFF".to_string(),
        r"\times dFF".to_string(),
    ]
}

fn default_raw_interaction() -> String {
    r"l1\_herfdepcty $\times$ dFF".to_string()
}

fn default_observations_label() -> String {
    "Observations".to_string()
}

fn default_fit_rows() -> Vec<String> {
    vec!["Within Adjusted R".to_string(), "Within R$^2$".to_string()]
}

fn default_headers() -> Vec<PanelHeaders> {
    vec![
        PanelHeaders {
            panel: "A".to_string(),
            replacements: vec![
                Replacement::new(
                    r"d\_total\_deposits",
                    r"\makecell[c]{$\Delta$Total\\deposits}",
                ),
                Replacement::new(
                    r"d\_deposit\_spread",
                    r"\makecell[c]{$\Delta$Deposit\\spread}",
                ),
                Replacement::new(
                    r"d\_savings\_deposits",
                    r"\makecell[c]{$\Delta$Savings\\deposits}",
                ),
                Replacement::new(
                    r"d\_time\_deposits",
                    r"\makecell[c]{$\Delta$Time\\deposits}",
                ),
                Replacement::new(
                    r"d\_wholesale\_funding",
                    r"\makecell[c]{$\Delta$Wholesale\\funding}",
                ),
                Replacement::new(
                    r"d\_total\_liabilities",
                    r"\makecell[c]{$\Delta$Total\\liabilities}",
                ),
            ],
        },
        PanelHeaders {
            panel: "B".to_string(),
            replacements: vec![
                Replacement::new(
                    r"d\_total\_assets",
                    r"\makecell[c]{$\Delta$Total\\assets}",
                ),
                Replacement::new(r"d\_cash", r"\makecell[c]{$\Delta$Cash}"),
                Replacement::new(
                    r"d\_total\_securities",
                    r"\makecell[c]{$\Delta$Securities}",
                ),
                Replacement::new(
                    r"d\_total\_loans",
                    r"\makecell[c]{$\Delta$Total\\loans}",
                ),
                Replacement::new(r"d\_re\_loans", r"\makecell[c]{$\Delta$RE\\loans}"),
                Replacement::new(r"d\_ci\_loans", r"\makecell[c]{$\Delta$C\&I\\loans}"),
            ],
        },
    ]
}

fn default_fe_labels() -> Vec<Replacement> {
    vec![
        Replacement::new("rssdid fixed effects", "Bank f.e."),
        Replacement::new(
            "rssdid-post2008 fixed effects",
            r"Bank $\times$ post-2008 f.e.",
        ),
        Replacement::new("dateq fixed effects", "Quarter f.e."),
    ]
}

fn default_filters() -> Vec<AxisLabel> {
    vec![
        AxisLabel::new("none", "None"),
        AxisLabel::new("growth", "Growth"),
        AxisLabel::new("winsor", "Winsor"),
        AxisLabel::new("both", r"\makecell{Growth+\\Winsor}"),
    ]
}

fn default_filter_samples() -> Vec<String> {
    vec!["full", "pre2008", "top25", "top10"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_robust_samples() -> Vec<AxisLabel> {
    vec![
        AxisLabel::new("full", "Full sample"),
        AxisLabel::new("pre2008", "Pre-2008"),
        AxisLabel::new("top25", r"Top 25\% assets"),
        AxisLabel::new("top10", r"Top 10\% assets"),
    ]
}

fn default_combined_filter() -> String {
    "both".to_string()
}

fn default_fe_sample() -> String {
    "full".to_string()
}

fn default_fe_specs() -> Vec<FeSpec> {
    vec![
        FeSpec::new("mainFE", true, true, true),
        FeSpec::new("noPost2008FE", true, true, false),
        FeSpec::new("noBankFE", false, true, true),
        FeSpec::new("noQuarterFE", true, false, true),
        FeSpec::new("onlyBankFE", true, false, false),
        FeSpec::new("quarterOnlyFE", false, true, false),
    ]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only explicitly provided arguments override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref dir) = args.tables_dir {
            self.paths.tables_dir = dir.clone();
        }
        if let Some(ref output) = args.output {
            self.paths.regression_data = output.clone();
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
