//! Error types for the panel and table pipelines.
//!
//! Every failure here is fatal for the step that raised it. Recoverable
//! conditions (non-positive log inputs, missing prior quarters) never
//! surface as errors; they become missing values.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which side of a join violated its cardinality contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSide {
    Left,
    Right,
}

impl fmt::Display for MergeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeSide::Left => write!(f, "left"),
            MergeSide::Right => write!(f, "right"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("column '{column}' not found in {}", path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("invalid {what}: '{value}'")]
    InvalidValue { what: &'static str, value: String },

    /// Duplicate join keys where the merge requires uniqueness.
    #[error("{merge} merge is not unique on the {side} side: duplicate key {key}")]
    MergeCardinality {
        merge: &'static str,
        side: MergeSide,
        key: String,
    },

    #[error("missing source table: {}", .0.display())]
    MissingFragment(PathBuf),

    #[error("could not locate {target} in {}", path.display())]
    MissingMarker { path: PathBuf, target: String },

    #[error("header variables in {} differ: expected {expected:?}, found {found:?}", path.display())]
    HeaderMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

impl PipelineError {
    /// Wrap an I/O error with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
