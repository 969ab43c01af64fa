//! Panel preparation.
//!
//! Loads the raw call reports, merges the concentration index and the policy
//! rate, derives the regression variables and writes the regression dataset.

pub mod features;
pub mod loader;
pub mod merge;
pub mod sample;
pub mod writer;

use crate::config::Config;
use crate::error::Result;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// What a preparation run produced.
#[derive(Debug, Clone, Default)]
pub struct PrepareSummary {
    /// Rows in the written dataset.
    pub rows: usize,
    /// Columns written after the identifiers.
    pub columns: usize,
    /// Integer-convertible columns found after the sample restriction.
    pub integer_columns: Vec<String>,
    /// Non-positive values set to missing, per log variable.
    pub suppressed: BTreeMap<String, usize>,
}

/// Run the full preparation sequence.
pub fn run(config: &Config) -> Result<PrepareSummary> {
    let paths = &config.paths;
    let variables = &config.variables;

    let mut panel = loader::load_records(&paths.records, &variables.columns)?;
    sample::restrict_sample(&mut panel, &config.sample);
    if panel.is_empty() {
        warn!("no records left after the sample restriction");
    }

    let integer_columns = features::integer_convertible_columns(&panel);
    writer::write_diagnostics(&integer_columns, &paths.diagnostics)?;

    let concentration =
        loader::load_concentration(&paths.concentration, &variables.concentration_column)?;
    merge::merge_concentration(&mut panel, &concentration, &variables.concentration_column)?;

    let rates = loader::load_policy_rate(&paths.policy_target, &paths.policy_lower, &paths.policy_upper)?;
    writer::write_policy_rate(&rates, &paths.policy_quarterly)?;
    merge::merge_policy_rate(&mut panel, &rates)?;

    features::compute_size_tier(&mut panel, &config.sample);
    features::compute_rates_and_spread(&mut panel);
    features::rename_columns(&mut panel, &variables.renames);
    features::compute_wholesale_funding(&mut panel);
    features::compute_growth_flag(&mut panel, config.sample.growth_threshold);
    let suppressed = features::log_difference(&mut panel, &variables.log_variables)?;

    sample::finalize(&mut panel, &config.sample);
    writer::write_regression_data(&panel, &paths.regression_data)?;

    info!(rows = panel.len(), columns = panel.columns.len(), "panel preparation complete");
    Ok(PrepareSummary {
        rows: panel.len(),
        columns: panel.columns.len(),
        integer_columns,
        suppressed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PathsConfig, SampleConfig};
    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use std::fs::{self, File};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    const VALUES: [&str; 13] = [
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
    ];

    /// One bank over four quarters of 2000, plus a bank of another charter type.
    fn write_records(path: &Path) {
        let mut fields = vec![
            Field::new("rssdid", DataType::Int64, true),
            Field::new("cert", DataType::Int64, true),
            Field::new("bhcid", DataType::Int64, true),
            Field::new("name", DataType::Utf8, true),
            Field::new("chartertype", DataType::Float64, true),
            Field::new("dateq", DataType::Utf8, true),
            Field::new("year", DataType::Int64, true),
            Field::new("quarter", DataType::Int64, true),
        ];
        fields.extend(VALUES.iter().map(|v| Field::new(*v, DataType::Float64, true)));
        let schema = Arc::new(Schema::new(fields));

        let assets = [100.0, 100.0, 210.0, 150.0];
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(vec![1, 1, 1, 1, 2])),
            Arc::new(Int64Array::from(vec![10, 10, 10, 10, 20])),
            Arc::new(Int64Array::from(vec![None, None, None, None, Some(5)])),
            Arc::new(StringArray::from(vec!["One"; 5])),
            Arc::new(Float64Array::from(vec![200.0, 200.0, 200.0, 200.0, 300.0])),
            Arc::new(StringArray::from(vec![
                "2000-03-31",
                "2000-06-30",
                "2000-09-30",
                "2000-12-31",
                "2000-03-31",
            ])),
            Arc::new(Int64Array::from(vec![2000; 5])),
            Arc::new(Int64Array::from(vec![1, 2, 3, 4, 1])),
        ];
        for name in VALUES {
            let values: Vec<f64> = match name {
                "assets" => assets.iter().copied().chain([1.0]).collect(),
                "liabilities" => vec![90.0, 90.0, 190.0, 130.0, 1.0],
                "deposits" => vec![80.0, 80.0, 150.0, 100.0, 1.0],
                "intexpdomdep" => vec![0.4, 0.6, 1.5, 1.0, 1.0],
                "cash" => vec![5.0, 0.0, 10.0, 20.0, 1.0],
                _ => vec![1.0; 5],
            };
            columns.push(Arc::new(Float64Array::from(values)));
        }

        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    fn test_config(dir: &Path) -> Config {
        let write = |name: &str, content: &str| {
            let path = dir.join(name);
            fs::write(&path, content).unwrap();
            path
        };

        let paths = PathsConfig {
            records: dir.join("records.parquet"),
            concentration: write(
                "l1.csv",
                "cert,dateq,l1_herfdepcty\n10,2000Q1,0.2\n10,2000Q2,0.25\n",
            ),
            policy_target: write(
                "target.csv",
                "observation_date,DFEDTAR\n2000-02-02,5.75\n2000-05-16,6.5\n2000-12-29,6.5\n",
            ),
            policy_lower: write("lower.csv", "observation_date,DFEDTARL\n"),
            policy_upper: write("upper.csv", "observation_date,DFEDTARU\n"),
            regression_data: dir.join("processed/regression_data.csv"),
            diagnostics: dir.join("processed/int.json"),
            policy_quarterly: dir.join("processed/ff.csv"),
            tables_dir: dir.join("tables"),
        };
        write_records(&paths.records);

        Config {
            paths,
            sample: SampleConfig {
                first_year: 1999,
                last_year: 2001,
                final_first_year: 2000,
                final_last_year: 2000,
                ..SampleConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());

        let summary = run(&config).unwrap();

        assert_eq!(summary.rows, 4);
        assert_eq!(summary.suppressed.get("cash"), Some(&1));
        for column in ["rssdid", "cert", "chartertype", "year", "quarter"] {
            assert!(summary.integer_columns.contains(&column.to_string()), "{column}");
        }

        let mut reader = csv::Reader::from_path(&config.paths.regression_data).unwrap();
        let headers = reader.headers().unwrap().clone();
        let col = |name: &str| headers.iter().position(|h| h == name).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();

        let growth: Vec<&str> = rows.iter().map(|r| &r[col("high_asset_growth")]).collect();
        assert_eq!(growth, vec!["0", "0", "1", "0"]);

        let merged: Vec<&str> = rows.iter().map(|r| &r[col("_merge")]).collect();
        assert_eq!(merged, vec!["both", "both", "left_only", "left_only"]);

        assert_eq!(&rows[0][col("d_total_assets")], "");
        assert_eq!(&rows[1][col("d_total_assets")], "0");
        assert_eq!(&rows[1][col("FF")], "0.065");
        assert_eq!(&rows[0][col("post2008")], "0");
        assert!(headers.iter().all(|h| h != "total_assets" && h != "cash"));
        assert!(headers.iter().any(|h| h == "d_wholesale_funding"));

        assert!(config.paths.diagnostics.exists());
        assert!(config.paths.policy_quarterly.exists());
    }

    #[test]
    fn test_run_fails_on_duplicate_concentration_key() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        fs::write(
            &config.paths.concentration,
            "cert,dateq,l1_herfdepcty\n10,2000Q1,0.2\n10,2000Q1,0.3\n",
        )
        .unwrap();

        let err = run(&config).unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::MergeCardinality { .. }));
        assert!(!config.paths.regression_data.exists());
    }
}
