//! Data models for the panel pipeline.
//!
//! A [`Panel`] is a list of bank-quarter [`Record`]s plus the ordered set of
//! numeric columns they carry. Identifiers are typed fields; every line item
//! and derived variable lives in the record's value map under its column name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// Provenance of the concentration merge for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    /// Key found in the auxiliary series.
    Both,
    /// Key absent from the auxiliary series.
    LeftOnly,
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStatus::Both => write!(f, "both"),
            MergeStatus::LeftOnly => write!(f, "left_only"),
        }
    }
}

/// One bank-quarter observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub rssdid: i64,
    pub cert: Option<i64>,
    pub bhcid: Option<i64>,
    pub name: Option<String>,
    pub chartertype: Option<f64>,
    /// Quarter-end date as written in the source.
    pub dateq: Option<String>,
    pub year: i32,
    pub quarter: u32,
    /// Set by the concentration merge.
    pub merge: Option<MergeStatus>,
    pub values: BTreeMap<String, Option<f64>>,
}

impl Record {
    /// A record with identifiers only.
    pub fn new(rssdid: i64, year: i32, quarter: u32) -> Self {
        Self {
            rssdid,
            cert: None,
            bhcid: None,
            name: None,
            chartertype: None,
            dateq: None,
            year,
            quarter,
            merge: None,
            values: BTreeMap::new(),
        }
    }

    /// Value of a numeric column; missing when absent or null.
    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }

    pub fn set(&mut self, column: &str, value: Option<f64>) {
        self.values.insert(column.to_string(), value);
    }

    #[cfg(test)]
    pub fn with(mut self, column: &str, value: f64) -> Self {
        self.set(column, Some(value));
        self
    }

    /// Sort key placing a bank's quarters in time order.
    pub fn time_key(&self) -> (i64, i32, u32) {
        (self.rssdid, self.year, self.quarter)
    }
}

/// Identifier columns written ahead of the numeric columns.
pub const ID_COLUMNS: [&str; 8] = [
    "rssdid",
    "cert",
    "bhcid",
    "name",
    "chartertype",
    "dateq",
    "year",
    "quarter",
];

/// Name of the merge-provenance column in the output.
pub const MERGE_COLUMN: &str = "_merge";

/// The bank-quarter panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    /// Numeric columns, in output order.
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Panel {
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Self {
        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Register a column name without touching records.
    fn register(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    /// Add or overwrite a column from per-record values (in record order).
    pub fn set_column(&mut self, column: &str, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.records.len());
        self.register(column);
        for (record, value) in self.records.iter_mut().zip(values) {
            record.set(column, value);
        }
    }

    /// Values of a column in record order.
    pub fn column(&self, column: &str) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.get(column)).collect()
    }

    pub fn drop_column(&mut self, column: &str) {
        self.columns.retain(|c| c != column);
        for record in &mut self.records {
            record.values.remove(column);
        }
    }

    /// Rename a column in place, keeping its output position.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        let Some(pos) = self.columns.iter().position(|c| c == from) else {
            return;
        };
        self.columns[pos] = to.to_string();
        for record in &mut self.records {
            if let Some(value) = record.values.remove(from) {
                record.values.insert(to.to_string(), value);
            }
        }
    }

    /// Order records by bank, then time. Stable, so repeat calls are no-ops.
    pub fn sort_by_bank_time(&mut self) {
        self.records.sort_by_key(Record::time_key);
    }

    /// Contiguous index ranges sharing a bank id. Assumes bank-sorted records.
    pub fn bank_runs(&self) -> Vec<Range<usize>> {
        let mut runs = Vec::new();
        let mut start = 0;
        for i in 1..=self.records.len() {
            if i == self.records.len() || self.records[i].rssdid != self.records[start].rssdid {
                runs.push(start..i);
                start = i;
            }
        }
        runs
    }

    /// `x[t] - x[t-1]` within each bank; missing for a bank's first row or
    /// when either side is missing.
    pub fn diff_by_bank(&self, column: &str) -> Vec<Option<f64>> {
        self.lag_apply(column, |prev, cur| Some(cur - prev))
    }

    /// `x[t] / x[t-1] - 1` within each bank. Division follows IEEE rules, so
    /// growth from zero is infinite rather than missing.
    pub fn pct_change_by_bank(&self, column: &str) -> Vec<Option<f64>> {
        self.lag_apply(column, |prev, cur| {
            let change = cur / prev - 1.0;
            (!change.is_nan()).then_some(change)
        })
    }

    fn lag_apply<F>(&self, column: &str, f: F) -> Vec<Option<f64>>
    where
        F: Fn(f64, f64) -> Option<f64>,
    {
        let values = self.column(column);
        let mut out = vec![None; values.len()];
        for run in self.bank_runs() {
            for i in run.start + 1..run.end {
                if let (Some(prev), Some(cur)) = (values[i - 1], values[i]) {
                    out[i] = f(prev, cur);
                }
            }
        }
        out
    }
}

/// One row of the concentration index.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcentrationRow {
    pub cert: Option<i64>,
    pub year: i32,
    pub quarter: u32,
    pub value: Option<f64>,
}

/// Quarterly policy rate level and its change from the previous quarter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyRate {
    pub year: i32,
    pub quarter: u32,
    #[serde(rename = "FF")]
    pub level: Option<f64>,
    #[serde(rename = "d_FF")]
    pub change: Option<f64>,
}
