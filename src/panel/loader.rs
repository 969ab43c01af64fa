//! Readers for the raw records and the two auxiliary series.

use crate::error::{PipelineError, Result};
use crate::models::{ConcentrationRow, Panel, PolicyRate, Record, ID_COLUMNS};
use arrow::array::{Array, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

/// Read the raw call reports, restricted to `columns`.
///
/// Every requested column must be present in the file. Rows missing the bank
/// id, year or quarter cannot be placed in the panel and are dropped.
#[tracing::instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_records(path: &Path, columns: &[String]) -> Result<Panel> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let schema = builder.schema().clone();
    for column in columns {
        if schema.index_of(column).is_err() {
            return Err(PipelineError::MissingColumn {
                column: column.clone(),
                path: path.to_path_buf(),
            });
        }
    }

    let mask = ProjectionMask::columns(builder.parquet_schema(), columns.iter().map(String::as_str));
    let reader = builder.with_projection(mask).build()?;

    let value_columns: Vec<String> = columns
        .iter()
        .filter(|c| !ID_COLUMNS.contains(&c.as_str()))
        .cloned()
        .collect();

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for batch in reader {
        let batch = batch?;
        dropped += append_batch(&batch, columns, &value_columns, &mut records)?;
    }

    if dropped > 0 {
        warn!(dropped, "rows without bank id, year or quarter dropped");
    }
    info!(rows = records.len(), "loaded records");

    Ok(Panel::new(value_columns, records))
}

fn append_batch(
    batch: &RecordBatch,
    columns: &[String],
    value_columns: &[String],
    records: &mut Vec<Record>,
) -> Result<usize> {
    let requested = |name: &str| columns.iter().any(|c| c == name);
    let numeric = |name: &str| -> Result<Vec<Option<f64>>> {
        if requested(name) {
            float_column(batch, name)
        } else {
            Ok(vec![None; batch.num_rows()])
        }
    };
    let text = |name: &str| -> Result<Vec<Option<String>>> {
        if requested(name) {
            string_column(batch, name)
        } else {
            Ok(vec![None; batch.num_rows()])
        }
    };

    let rssdid = numeric("rssdid")?;
    let cert = numeric("cert")?;
    let bhcid = numeric("bhcid")?;
    let chartertype = numeric("chartertype")?;
    let year = numeric("year")?;
    let quarter = numeric("quarter")?;
    let mut name = text("name")?;
    let mut dateq = text("dateq")?;

    let values: Vec<(&String, Vec<Option<f64>>)> = value_columns
        .iter()
        .map(|c| float_column(batch, c).map(|v| (c, v)))
        .collect::<Result<_>>()?;

    let mut dropped = 0;
    for row in 0..batch.num_rows() {
        let (Some(id), Some(y), Some(q)) = (
            rssdid[row].and_then(to_int),
            year[row].and_then(to_int),
            quarter[row].and_then(to_int),
        ) else {
            dropped += 1;
            continue;
        };

        let mut record = Record::new(id, y as i32, q as u32);
        record.cert = cert[row].and_then(to_int);
        record.bhcid = bhcid[row].and_then(to_int);
        record.chartertype = chartertype[row];
        record.name = name[row].take();
        record.dateq = dateq[row].take();
        for (column, column_values) in &values {
            record.set(column, column_values[row]);
        }
        records.push(record);
    }

    Ok(dropped)
}

fn to_int(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
}

/// A column cast to `Float64`; NaN is treated as missing.
fn float_column(batch: &RecordBatch, name: &str) -> Result<Vec<Option<f64>>> {
    let index = batch.schema().index_of(name)?;
    let array = cast(batch.column(index), &DataType::Float64)?;
    let floats = array
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| PipelineError::InvalidValue {
            what: "numeric column",
            value: name.to_string(),
        })?;
    Ok(floats.iter().map(|v| v.filter(|x| !x.is_nan())).collect())
}

fn string_column(batch: &RecordBatch, name: &str) -> Result<Vec<Option<String>>> {
    let index = batch.schema().index_of(name)?;
    let array = cast(batch.column(index), &DataType::Utf8)?;
    let strings = array
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PipelineError::InvalidValue {
            what: "text column",
            value: name.to_string(),
        })?;
    Ok(strings.iter().map(|v| v.map(str::to_string)).collect())
}

/// Parse an optional number; blanks and the `.` placeholder are missing.
pub(crate) fn parse_optional_f64(raw: &str, what: &'static str) -> Result<Option<f64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(|v| (!v.is_nan()).then_some(v))
        .map_err(|_| PipelineError::InvalidValue {
            what,
            value: raw.to_string(),
        })
}

/// Split a quarter label like `1993Q1`: year from the first four characters,
/// quarter from the last.
pub(crate) fn parse_quarter_label(label: &str) -> Result<(i32, u32)> {
    let invalid = || PipelineError::InvalidValue {
        what: "quarter label",
        value: label.to_string(),
    };
    let label = label.trim();
    let year = label
        .get(..4)
        .and_then(|y| y.parse::<i32>().ok())
        .ok_or_else(invalid)?;
    let quarter = label
        .chars()
        .last()
        .and_then(|c| c.to_digit(10))
        .filter(|q| (1..=4).contains(q))
        .ok_or_else(invalid)?;
    Ok((year, quarter))
}

/// Read the concentration index keyed by certificate and quarter.
#[tracing::instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_concentration(path: &Path, column: &str) -> Result<Vec<ConcentrationRow>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| PipelineError::MissingColumn {
                column: name.to_string(),
                path: path.to_path_buf(),
            })
    };
    let cert_idx = position("cert")?;
    let date_idx = position("dateq")?;
    let value_idx = position(column)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let cert = parse_optional_f64(record.get(cert_idx).unwrap_or(""), "certificate id")?
            .and_then(to_int);
        let (year, quarter) = parse_quarter_label(record.get(date_idx).unwrap_or(""))?;
        let value = parse_optional_f64(record.get(value_idx).unwrap_or(""), "concentration")?;
        rows.push(ConcentrationRow {
            cert,
            year,
            quarter,
            value,
        });
    }

    info!(rows = rows.len(), "loaded concentration index");
    Ok(rows)
}

/// Read a date-indexed series: first column the observation date, second the value.
fn load_series(path: &Path) -> Result<BTreeMap<NaiveDate, Option<f64>>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut series = BTreeMap::new();
    for result in reader.records() {
        let record = result?;
        let raw_date = record.get(0).unwrap_or("").trim();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|_| {
            PipelineError::InvalidValue {
                what: "observation date",
                value: raw_date.to_string(),
            }
        })?;
        let value = parse_optional_f64(record.get(1).unwrap_or(""), "policy rate")?;
        series.insert(date, value);
    }
    debug!(path = %path.display(), observations = series.len(), "loaded series");
    Ok(series)
}

fn quarter_of(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month0() / 3 + 1)
}

fn next_quarter((year, quarter): (i32, u32)) -> (i32, u32) {
    if quarter == 4 {
        (year + 1, 1)
    } else {
        (year, quarter + 1)
    }
}

/// Build the quarterly policy rate from the target series and the bounds of
/// the target range.
///
/// Daily level is the published target, replaced by the midpoint of the range
/// wherever an upper bound exists. Each calendar quarter takes its last
/// available daily level, quarters without observations stay missing, levels
/// are converted from percent, and the change is taken against the previous
/// calendar quarter.
pub fn combine_policy_series(
    target: &BTreeMap<NaiveDate, Option<f64>>,
    lower: &BTreeMap<NaiveDate, Option<f64>>,
    upper: &BTreeMap<NaiveDate, Option<f64>>,
) -> Vec<PolicyRate> {
    let mut daily: BTreeMap<NaiveDate, Option<f64>> = BTreeMap::new();
    for date in target.keys().chain(lower.keys()).chain(upper.keys()) {
        daily.entry(*date).or_insert(None);
    }
    for (date, value) in target {
        daily.insert(*date, *value);
    }
    for (date, high) in upper {
        let low = lower.get(date).copied().flatten();
        let mid = match (*high, low) {
            (Some(h), Some(l)) => Some((h + l) / 2.0),
            _ => None,
        };
        daily.insert(*date, mid);
    }

    let (Some(first), Some(last)) = (daily.keys().next(), daily.keys().next_back()) else {
        return Vec::new();
    };
    let (first, last) = (quarter_of(*first), quarter_of(*last));

    let mut last_in_quarter: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for (date, value) in &daily {
        if let Some(v) = value {
            last_in_quarter.insert(quarter_of(*date), *v);
        }
    }

    let mut rates = Vec::new();
    let mut previous: Option<f64> = None;
    let mut current = first;
    loop {
        let level = last_in_quarter.get(&current).map(|v| v / 100.0);
        let change = match (level, previous) {
            (Some(now), Some(before)) => Some(now - before),
            _ => None,
        };
        rates.push(PolicyRate {
            year: current.0,
            quarter: current.1,
            level,
            change,
        });
        previous = level;
        if current == last {
            break;
        }
        current = next_quarter(current);
    }
    rates
}

/// Load and combine the three policy-rate series.
pub fn load_policy_rate(target: &Path, lower: &Path, upper: &Path) -> Result<Vec<PolicyRate>> {
    let rates = combine_policy_series(
        &load_series(target)?,
        &load_series(lower)?,
        &load_series(upper)?,
    );
    info!(quarters = rates.len(), "built quarterly policy rate");
    Ok(rates)
}
