//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// callpanel - bank call-report panel preparation and table assembly
///
/// Builds the regression dataset from raw call reports, then cleans the
/// regression tables produced from it and assembles the composite tables.
///
/// Examples:
///   callpanel --stage prepare
///   callpanel --stage tables --tables-dir out/tables
///   callpanel --config analysis.toml --verbose
///   callpanel --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Pipeline steps to run
    #[arg(long, default_value = "all", value_name = "STAGE")]
    pub stage: Stage,

    /// Path to configuration file
    ///
    /// If not specified, looks for .callpanel.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the regression table fragments
    #[arg(long, value_name = "DIR", env = "CALLPANEL_TABLES_DIR")]
    pub tables_dir: Option<PathBuf>,

    /// Output path for the regression dataset
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable the progress bar during fragment cleanup
    #[arg(long)]
    pub no_progress: bool,

    /// Generate a default .callpanel.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Which part of the pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Stage {
    /// Build the regression dataset
    Prepare,
    /// Clean the regression table fragments in place
    Clean,
    /// Assemble composite tables from cleaned fragments
    Compose,
    /// Clean, then compose
    Tables,
    /// Everything, in order
    #[default]
    All,
}

impl Stage {
    pub fn runs_prepare(self) -> bool {
        matches!(self, Stage::Prepare | Stage::All)
    }

    pub fn runs_clean(self) -> bool {
        matches!(self, Stage::Clean | Stage::Tables | Stage::All)
    }

    pub fn runs_compose(self) -> bool {
        matches!(self, Stage::Compose | Stage::Tables | Stage::All)
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref dir) = self.tables_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(format!(
                    "Tables path is not a directory: {}",
                    dir.display()
                ));
            }
        }

        if let Some(ref config) = self.config {
            if !config.exists() {
                return Err(format!("Config file does not exist: {}", config.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Whether to draw a progress bar.
    pub fn show_progress(&self) -> bool {
        !self.quiet && !self.no_progress
    }
}
