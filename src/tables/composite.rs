//! Composite tables built from several fragments.

use super::parser::read_fragment;
use super::render::render_composite;
use super::{CompositeKind, FragmentKey};
use crate::config::TablesConfig;
use crate::error::{PipelineError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Marker for an included fixed effect.
const INCLUDED: &str = "Y";

/// One row of a composite: leading label cells, then the stacked estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeRow {
    pub lead: Vec<String>,
    pub cells: Vec<String>,
    pub observations: Option<String>,
}

/// A composite ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub kind: CompositeKind,
    pub header_vars: Vec<String>,
    pub header_nums: Vec<String>,
    pub rows: Vec<CompositeRow>,
}

/// Load one fragment per axis value and stack their interaction rows.
///
/// Every fragment must report the same dependent variables as the first.
fn assemble(
    kind: CompositeKind,
    dir: &Path,
    tables: &TablesConfig,
    axis: Vec<(Vec<String>, FragmentKey)>,
) -> Result<Composite> {
    let require_observations = kind.reports_observations();
    let mut header: Option<(Vec<String>, Vec<String>)> = None;
    let mut rows = Vec::with_capacity(axis.len());

    for (lead, key) in axis {
        let path = dir.join(key.file_name(&tables.prefix));
        let parsed = read_fragment(&path, tables, require_observations)?;

        if header.is_none() {
            header = Some((parsed.header_vars.clone(), parsed.header_nums.clone()));
        }
        if let Some((vars, _)) = &header {
            if *vars != parsed.header_vars {
                return Err(PipelineError::HeaderMismatch {
                    path,
                    expected: vars.clone(),
                    found: parsed.header_vars,
                });
            }
        }

        if require_observations && parsed.observations_vary() {
            warn!(
                path = %path.display(),
                observations = ?parsed.observations,
                "observation counts differ across columns, using the first"
            );
        }

        rows.push(CompositeRow {
            lead,
            cells: parsed.stacked_cells(),
            observations: require_observations.then(|| parsed.first_observation().to_string()),
        });
    }

    let (header_vars, header_nums) = header.ok_or_else(|| PipelineError::InvalidValue {
        what: "composite axis",
        value: format!("{:?} has no entries", kind),
    })?;

    Ok(Composite {
        kind,
        header_vars,
        header_nums,
        rows,
    })
}

fn write_composite(composite: &Composite, tables: &TablesConfig, path: PathBuf) -> Result<PathBuf> {
    let text = render_composite(composite, &tables.interaction_label);
    fs::write(&path, text).map_err(|e| PipelineError::io(&path, e))?;
    info!(path = %path.display(), rows = composite.rows.len(), "wrote composite");
    Ok(path)
}

/// Compare the outlier filters for one sample and panel.
pub fn build_filter_composite(
    dir: &Path,
    tables: &TablesConfig,
    sample: &str,
    panel: &str,
) -> Result<PathBuf> {
    let axis = tables
        .filters
        .iter()
        .map(|f| (vec![f.label.clone()], FragmentKey::new(panel, sample, &f.tag)))
        .collect();
    let composite = assemble(CompositeKind::Filters, dir, tables, axis)?;

    let out = CompositeKind::Filters.file_name(&tables.prefix, panel, sample, "");
    write_composite(&composite, tables, dir.join(out))
}

/// Compare fixed-effect specifications for one sample, filter and panel.
pub fn build_fe_composite(
    dir: &Path,
    tables: &TablesConfig,
    sample: &str,
    filter: &str,
    panel: &str,
) -> Result<PathBuf> {
    let flag = |on: bool| (if on { INCLUDED } else { "" }).to_string();
    let axis = tables
        .fe_specs
        .iter()
        .map(|spec| {
            (
                vec![flag(spec.bank), flag(spec.quarter), flag(spec.post)],
                FragmentKey::new(panel, sample, filter).with_fe(&spec.tag),
            )
        })
        .collect();
    let composite = assemble(CompositeKind::FixedEffects, dir, tables, axis)?;

    let out = CompositeKind::FixedEffects.file_name(&tables.prefix, panel, sample, filter);
    write_composite(&composite, tables, dir.join(out))
}

/// Compare samples for one panel under the combined filter.
pub fn build_robustness_composite(dir: &Path, tables: &TablesConfig, panel: &str) -> Result<PathBuf> {
    let axis = tables
        .robust_samples
        .iter()
        .map(|s| {
            (
                vec![s.label.clone()],
                FragmentKey::new(panel, &s.tag, &tables.robust_filter),
            )
        })
        .collect();
    let composite = assemble(CompositeKind::Robustness, dir, tables, axis)?;

    let out = CompositeKind::Robustness.file_name(&tables.prefix, panel, "", "");
    write_composite(&composite, tables, dir.join(out))
}
