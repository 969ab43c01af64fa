//! Discovery of regression fragments in the tables directory.

use crate::config::TablesConfig;
use crate::error::{PipelineError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extension of every fragment.
const EXTENSION: &str = "tex";

/// Stem suffix shared by every composite output.
const COMPOSITE_SUFFIX: &str = "composite";

/// A fragment found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentFile {
    pub path: PathBuf,
    /// Panel token taken from the file name.
    pub panel: String,
}

/// Scanner over one tables directory.
pub struct FragmentScanner<'a> {
    dir: PathBuf,
    tables: &'a TablesConfig,
}

impl<'a> FragmentScanner<'a> {
    pub fn new(dir: impl Into<PathBuf>, tables: &'a TablesConfig) -> Self {
        Self {
            dir: dir.into(),
            tables,
        }
    }

    /// Every fragment in the directory, sorted by file name.
    ///
    /// Composites, hidden files and panels without header relabels are
    /// skipped. Subdirectories are not descended into.
    pub fn scan(&self) -> Result<Vec<FragmentFile>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| PipelineError::io(&self.dir, e))?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match self.panel_of(&path) {
                Some(panel) => files.push(FragmentFile { path, panel }),
                None => debug!(path = %path.display(), "skipping non-fragment file"),
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Panel of a fragment path, or `None` when the path is not a fragment.
    pub fn panel_of(&self, path: &Path) -> Option<String> {
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        if stem.starts_with('.') || stem.ends_with(COMPOSITE_SUFFIX) {
            return None;
        }

        let mut tokens = stem.split('_');
        if tokens.next()? != self.tables.prefix {
            return None;
        }
        let panel = tokens.next()?;
        // At least a sample and a filter follow the panel.
        if tokens.count() < 2 {
            return None;
        }
        self.tables
            .headers_for(panel)
            .map(|_| panel.to_string())
    }
}
