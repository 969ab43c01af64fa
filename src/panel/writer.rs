//! Output files of the panel pipeline.

use crate::error::{PipelineError, Result};
use crate::models::{Panel, PolicyRate, ID_COLUMNS, MERGE_COLUMN};
use std::fs::{self, File};
use std::path::Path;
use tracing::info;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    Ok(())
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn format_int(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write the regression dataset: identifiers, merge provenance, then every
/// numeric column in panel order. Missing values are empty fields.
pub fn write_regression_data(panel: &Panel, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;

    let header: Vec<&str> = ID_COLUMNS
        .iter()
        .copied()
        .chain(std::iter::once(MERGE_COLUMN))
        .chain(panel.columns.iter().map(String::as_str))
        .collect();
    writer.write_record(&header)?;

    for record in &panel.records {
        let mut row = vec![
            record.rssdid.to_string(),
            format_int(record.cert),
            format_int(record.bhcid),
            record.name.clone().unwrap_or_default(),
            format_value(record.chartertype),
            record.dateq.clone().unwrap_or_default(),
            record.year.to_string(),
            record.quarter.to_string(),
            record.merge.map(|m| m.to_string()).unwrap_or_default(),
        ];
        row.extend(panel.columns.iter().map(|c| format_value(record.get(c))));
        writer.write_record(&row)?;
    }

    writer
        .flush()
        .map_err(|e| PipelineError::io(path, e))?;
    info!(path = %path.display(), rows = panel.len(), "wrote regression data");
    Ok(())
}

/// Write the quarterly policy rate.
pub fn write_policy_rate(rates: &[PolicyRate], path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for rate in rates {
        writer.serialize(rate)?;
    }
    writer
        .flush()
        .map_err(|e| PipelineError::io(path, e))?;
    info!(path = %path.display(), quarters = rates.len(), "wrote policy rate");
    Ok(())
}

/// Write the integer-convertible column list as pretty JSON.
pub fn write_diagnostics(columns: &[String], path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::to_writer_pretty(file, columns)?;
    info!(path = %path.display(), count = columns.len(), "found integer columns");
    Ok(())
}
