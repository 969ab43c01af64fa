//! Left joins of the auxiliary series onto the panel.
//!
//! Both joins validate key cardinality first and fail rather than duplicate
//! or drop rows.

use crate::error::{MergeSide, PipelineError, Result};
use crate::models::{ConcentrationRow, MergeStatus, Panel, PolicyRate};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::{debug, info};

/// Policy-rate level column.
pub const POLICY_LEVEL: &str = "FF";
/// Policy-rate change column.
pub const POLICY_CHANGE: &str = "d_FF";

type ConcentrationKey = (Option<i64>, i32, u32);

fn describe_concentration_key((cert, year, quarter): &ConcentrationKey) -> String {
    match cert {
        Some(cert) => format!("(cert={}, {}Q{})", cert, year, quarter),
        None => format!("(cert=missing, {}Q{})", year, quarter),
    }
}

/// First key occurring twice, if any.
fn first_duplicate<K, I>(keys: I) -> Option<K>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = K>,
{
    let mut seen = HashSet::new();
    keys.into_iter().find(|key| !seen.insert(key.clone()))
}

/// One-to-one left join of the concentration index on `(cert, year, quarter)`.
///
/// Adds `column` to the panel and sets each record's merge provenance.
pub fn merge_concentration(
    panel: &mut Panel,
    aux: &[ConcentrationRow],
    column: &str,
) -> Result<()> {
    if let Some(key) = first_duplicate(panel.records.iter().map(|r| (r.cert, r.year, r.quarter))) {
        return Err(PipelineError::MergeCardinality {
            merge: "concentration",
            side: MergeSide::Left,
            key: describe_concentration_key(&key),
        });
    }

    let mut lookup: HashMap<ConcentrationKey, Option<f64>> = HashMap::with_capacity(aux.len());
    for row in aux {
        let key = (row.cert, row.year, row.quarter);
        if lookup.insert(key, row.value).is_some() {
            return Err(PipelineError::MergeCardinality {
                merge: "concentration",
                side: MergeSide::Right,
                key: describe_concentration_key(&key),
            });
        }
    }

    let mut matched = 0usize;
    let mut matched_missing = 0usize;
    let values: Vec<Option<f64>> = panel
        .records
        .iter_mut()
        .map(|record| match lookup.get(&(record.cert, record.year, record.quarter)) {
            Some(value) => {
                record.merge = Some(MergeStatus::Both);
                matched += 1;
                if value.is_none() {
                    matched_missing += 1;
                }
                *value
            }
            None => {
                record.merge = Some(MergeStatus::LeftOnly);
                None
            }
        })
        .collect();
    panel.set_column(column, values);

    info!(
        matched,
        unmatched = panel.len() - matched,
        "merged concentration index"
    );
    debug!(matched_missing, "matched rows with a missing concentration value");
    Ok(())
}

/// Many-to-one left join of the policy rate on `(year, quarter)`.
///
/// Only the rate side must be unique. Adds [`POLICY_LEVEL`] and [`POLICY_CHANGE`].
pub fn merge_policy_rate(panel: &mut Panel, rates: &[PolicyRate]) -> Result<()> {
    let mut lookup: HashMap<(i32, u32), &PolicyRate> = HashMap::with_capacity(rates.len());
    for rate in rates {
        if lookup.insert((rate.year, rate.quarter), rate).is_some() {
            return Err(PipelineError::MergeCardinality {
                merge: "policy rate",
                side: MergeSide::Right,
                key: format!("({}Q{})", rate.year, rate.quarter),
            });
        }
    }

    let found: Vec<Option<&PolicyRate>> = panel
        .records
        .iter()
        .map(|r| lookup.get(&(r.year, r.quarter)).copied())
        .collect();
    let levels = found.iter().map(|r| r.and_then(|r| r.level)).collect();
    let changes = found.iter().map(|r| r.and_then(|r| r.change)).collect();
    let unmatched = found.iter().filter(|r| r.is_none()).count();

    panel.set_column(POLICY_LEVEL, levels);
    panel.set_column(POLICY_CHANGE, changes);

    info!(unmatched, "merged policy rate");
    Ok(())
}
