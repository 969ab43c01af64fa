//! callpanel - bank call-report panel preparation and table assembly
//!
//! Builds the quarterly bank panel used by the deposit-channel regressions
//! and turns the per-specification regression tables into composite tables.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Any fatal error (bad arguments, missing input, merge or table failure)

mod cli;
mod config;
mod error;
mod models;
mod panel;
mod tables;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // No logging needed for --init-config
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("callpanel v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(&args) {
        error!("Pipeline failed: {:#}", e);
        eprintln!("\nError: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Handle --init-config: write the default configuration file.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to point at your input files and table directory.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` takes precedence over the verbosity flags.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the selected stages in order.
fn run(args: &Args) -> Result<()> {
    let start_time = Instant::now();

    let mut config = load_config(args)?;
    config.merge_with_args(args);

    if args.stage.runs_prepare() {
        let summary = panel::run(&config).context("Panel preparation failed")?;
        println!(
            "Wrote {} rows x {} columns to {}",
            summary.rows,
            summary.columns,
            config.paths.regression_data.display()
        );
        info!("Found {} integer columns", summary.integer_columns.len());
        for (variable, count) in summary.suppressed.iter().filter(|(_, c)| **c > 0) {
            debug!(variable = %variable, count, "non-positive values set to missing");
        }
    }

    if args.stage.runs_clean() {
        let cleaned = tables::run_cleanup(&config, args.show_progress())
            .context("Table cleanup failed")?;
        println!(
            "Cleaned {} fragments in {}",
            cleaned.len(),
            config.paths.tables_dir.display()
        );
    }

    if args.stage.runs_compose() {
        let written = tables::run_composites(&config).context("Composite assembly failed")?;
        for path in &written {
            println!("Wrote {}", path.display());
        }
    }

    info!(
        "Finished {:?} in {:.1}s",
        args.stage,
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Err(e)
        }
    }
}
