//! Derived regression variables.
//!
//! Within-bank operations sort the panel by bank and time first, so they can
//! be applied in any order.

use crate::config::{Replacement, SampleConfig};
use crate::error::{PipelineError, Result};
use crate::models::{Panel, Record};
use crate::panel::merge::POLICY_CHANGE;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

// Raw input names.
const ASSETS: &str = "assets";
const DEPOSITS: &str = "deposits";
const INTEREST_EXPENSE: &str = "intexpdomdep";

// Names after renaming.
const TOTAL_ASSETS: &str = "total_assets";
const TOTAL_DEPOSITS: &str = "total_deposits";
const TOTAL_LIABILITIES: &str = "total_liabilities";

pub const AVG_ASSETS: &str = "avg_assets";
pub const TOP_WIDE: &str = "top25_assets";
pub const TOP_NARROW: &str = "top10_assets";
pub const DEPOSIT_RATE: &str = "deposit_rate";
pub const D_DEPOSIT_RATE: &str = "d_deposit_rate";
pub const D_DEPOSIT_SPREAD: &str = "d_deposit_spread";
pub const WHOLESALE_FUNDING: &str = "wholesale_funding";
pub const HIGH_GROWTH: &str = "high_asset_growth";

fn indicator(flag: bool) -> Option<f64> {
    Some(if flag { 1.0 } else { 0.0 })
}

/// Quantile with linear interpolation between closest ranks.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64))
}

/// Label each record with whether its bank's time-averaged assets reach the
/// wide and narrow percentile cutoffs.
///
/// Cutoffs come from the distribution of bank averages, one value per bank,
/// not from bank-quarter observations.
pub fn compute_size_tier(panel: &mut Panel, sample: &SampleConfig) {
    let mut sums: HashMap<i64, (f64, usize)> = HashMap::new();
    for record in &panel.records {
        let entry = sums.entry(record.rssdid).or_insert((0.0, 0));
        if let Some(assets) = record.get(ASSETS) {
            entry.0 += assets;
            entry.1 += 1;
        }
    }
    let averages: HashMap<i64, Option<f64>> = sums
        .into_iter()
        .map(|(id, (sum, n))| (id, (n > 0).then(|| sum / n as f64)))
        .collect();

    let bank_values: Vec<f64> = averages.values().flatten().copied().collect();
    let wide = quantile(&bank_values, sample.top_quantile_wide);
    let narrow = quantile(&bank_values, sample.top_quantile_narrow);
    info!(banks = averages.len(), ?wide, ?narrow, "size tier cutoffs");

    let above = |avg: Option<f64>, cutoff: Option<f64>| match (avg, cutoff) {
        (Some(a), Some(c)) => a >= c,
        _ => false,
    };

    let avg: Vec<Option<f64>> = panel
        .records
        .iter()
        .map(|r| averages.get(&r.rssdid).copied().flatten())
        .collect();
    let top_wide = avg.iter().map(|a| indicator(above(*a, wide))).collect();
    let top_narrow = avg.iter().map(|a| indicator(above(*a, narrow))).collect();

    panel.set_column(AVG_ASSETS, avg);
    panel.set_column(TOP_WIDE, top_wide);
    panel.set_column(TOP_NARROW, top_narrow);
}

/// Annualized deposit rate, its within-bank change, and the spread between
/// the policy-rate change and the deposit-rate change.
pub fn compute_rates_and_spread(panel: &mut Panel) {
    panel.sort_by_bank_time();

    let rates: Vec<Option<f64>> = panel
        .records
        .iter()
        .map(|r| match (r.get(INTEREST_EXPENSE), r.get(DEPOSITS)) {
            (Some(expense), Some(deposits)) => {
                let rate = 4.0 * expense / deposits;
                rate.is_finite().then_some(rate)
            }
            _ => None,
        })
        .collect();
    panel.set_column(DEPOSIT_RATE, rates);

    let changes = panel.diff_by_bank(DEPOSIT_RATE);
    let spread = panel
        .records
        .iter()
        .zip(&changes)
        .map(|(r, d_rate)| match (r.get(POLICY_CHANGE), d_rate) {
            (Some(d_ff), Some(d_rate)) => Some(d_ff - d_rate),
            _ => None,
        })
        .collect();
    panel.set_column(D_DEPOSIT_RATE, changes);
    panel.set_column(D_DEPOSIT_SPREAD, spread);
}

/// Rename raw line items to their analysis names.
pub fn rename_columns(panel: &mut Panel, renames: &[Replacement]) {
    for rename in renames {
        panel.rename_column(&rename.from, &rename.to);
    }
}

/// Non-deposit liabilities.
pub fn compute_wholesale_funding(panel: &mut Panel) {
    let values = panel
        .records
        .iter()
        .map(|r| match (r.get(TOTAL_LIABILITIES), r.get(TOTAL_DEPOSITS)) {
            (Some(liabilities), Some(deposits)) => Some(liabilities - deposits),
            _ => None,
        })
        .collect();
    panel.set_column(WHOLESALE_FUNDING, values);
}

/// Flag quarters where total assets grew by at least `threshold` (1.0 means
/// the balance sheet at least doubled). A quarter without a usable prior
/// value is not flagged.
pub fn compute_growth_flag(panel: &mut Panel, threshold: f64) {
    panel.sort_by_bank_time();
    let flags = panel
        .pct_change_by_bank(TOTAL_ASSETS)
        .into_iter()
        .map(|g| indicator(g.is_some_and(|g| g >= threshold)))
        .collect();
    panel.set_column(HIGH_GROWTH, flags);
}

/// Replace each variable by the within-bank first difference of its log,
/// stored as `d_<variable>`. Non-positive values become missing before the
/// log is taken. Returns the number of suppressed values per variable.
pub fn log_difference(panel: &mut Panel, variables: &[String]) -> Result<BTreeMap<String, usize>> {
    panel.sort_by_bank_time();
    let mut suppressed = BTreeMap::new();

    for variable in variables {
        if !panel.has_column(variable) {
            return Err(PipelineError::UnknownColumn(variable.clone()));
        }

        let mut non_positive = 0usize;
        let logs: Vec<Option<f64>> = panel
            .column(variable)
            .into_iter()
            .map(|v| match v {
                Some(x) if x > 0.0 => Some(x.ln()),
                Some(_) => {
                    non_positive += 1;
                    None
                }
                None => None,
            })
            .collect();
        info!(variable = %variable, non_positive, "suppressed non-positive values");

        panel.set_column(variable, logs);
        let diffs = panel.diff_by_bank(variable);
        panel.drop_column(variable);
        panel.set_column(&format!("d_{}", variable), diffs);

        suppressed.insert(variable.clone(), non_positive);
    }

    Ok(suppressed)
}

/// Columns whose non-missing values are all finite whole numbers.
///
/// Numeric identifiers come first, in output order, then the value columns.
pub fn integer_convertible_columns(panel: &Panel) -> Vec<String> {
    fn whole(values: &[Option<f64>]) -> bool {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        !present.is_empty() && present.iter().all(|v| v.is_finite() && v.fract() == 0.0)
    }

    let identifiers: [(&str, fn(&Record) -> Option<f64>); 6] = [
        ("rssdid", |r| Some(r.rssdid as f64)),
        ("cert", |r| r.cert.map(|c| c as f64)),
        ("bhcid", |r| r.bhcid.map(|b| b as f64)),
        ("chartertype", |r| r.chartertype),
        ("year", |r| Some(f64::from(r.year))),
        ("quarter", |r| Some(f64::from(r.quarter))),
    ];

    let mut columns = Vec::new();
    for (name, value) in identifiers {
        let values: Vec<Option<f64>> = panel.records.iter().map(value).collect();
        if whole(&values) {
            columns.push(name.to_string());
        }
    }
    for column in &panel.columns {
        if whole(&panel.column(column)) {
            columns.push(column.clone());
        }
    }
    debug!(count = columns.len(), "integer-convertible columns");
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(rssdid: i64, column: &str, values: &[Option<f64>]) -> Vec<Record> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut r = Record::new(rssdid, 2000 + (i as i32) / 4, (i as u32) % 4 + 1);
                r.set(column, *v);
                r
            })
            .collect()
    }

    fn assets_panel(banks: &[(i64, &[f64])]) -> Panel {
        let mut records = Vec::new();
        for (id, values) in banks {
            let values: Vec<Option<f64>> = values.iter().map(|v| Some(*v)).collect();
            records.extend(series(*id, ASSETS, &values));
        }
        Panel::new(vec![ASSETS.to_string()], records)
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.75), Some(3.25));
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_size_tier_uses_bank_averages() {
        // Bank 1 has many quarters at a small size; it must not pull the
        // cutoffs toward itself.
        let panel_banks: Vec<(i64, Vec<f64>)> = vec![
            (1, vec![10.0; 40]),
            (2, vec![20.0]),
            (3, vec![30.0]),
            (4, vec![40.0]),
            (5, vec![50.0]),
        ];
        let borrowed: Vec<(i64, &[f64])> =
            panel_banks.iter().map(|(id, v)| (*id, v.as_slice())).collect();
        let mut panel = assets_panel(&borrowed);

        compute_size_tier(&mut panel, &SampleConfig::default());

        // Bank averages 10..50: 75th percentile = 40, 90th = 46.
        let tier = |id: i64| {
            let r = panel.records.iter().find(|r| r.rssdid == id).unwrap();
            (r.get(TOP_WIDE), r.get(TOP_NARROW))
        };
        assert_eq!(tier(1), (Some(0.0), Some(0.0)));
        assert_eq!(tier(3), (Some(0.0), Some(0.0)));
        assert_eq!(tier(4), (Some(1.0), Some(0.0)));
        assert_eq!(tier(5), (Some(1.0), Some(1.0)));
    }

    #[test]
    fn test_size_tier_is_monotone_in_average_assets() {
        let banks: Vec<(i64, Vec<f64>)> = (1..=20)
            .map(|id| (id, vec![(id * 7 % 13) as f64 * 100.0, (id * 3) as f64]))
            .collect();
        let borrowed: Vec<(i64, &[f64])> = banks.iter().map(|(id, v)| (*id, v.as_slice())).collect();
        let mut panel = assets_panel(&borrowed);

        compute_size_tier(&mut panel, &SampleConfig::default());

        for x in &panel.records {
            for y in &panel.records {
                if x.get(AVG_ASSETS) >= y.get(AVG_ASSETS) {
                    assert!(x.get(TOP_WIDE) >= y.get(TOP_WIDE));
                    assert!(x.get(TOP_NARROW) >= y.get(TOP_NARROW));
                }
            }
        }
    }

    #[test]
    fn test_deposit_rate_and_spread() {
        let mut records = Vec::new();
        for (q, (expense, ff)) in [(1.0, 0.01), (2.0, 0.02)].iter().enumerate() {
            let r = crate::models::Record::new(7, 2005, q as u32 + 1)
                .with(INTEREST_EXPENSE, *expense)
                .with(DEPOSITS, 100.0)
                .with(POLICY_CHANGE, *ff);
            records.push(r);
        }
        let mut panel = Panel::new(vec![], records);

        compute_rates_and_spread(&mut panel);

        assert_eq!(panel.column(DEPOSIT_RATE), vec![Some(0.04), Some(0.08)]);
        assert_eq!(panel.records[0].get(D_DEPOSIT_RATE), None);
        assert!((panel.records[1].get(D_DEPOSIT_RATE).unwrap() - 0.04).abs() < 1e-12);
        assert!((panel.records[1].get(D_DEPOSIT_SPREAD).unwrap() - (-0.02)).abs() < 1e-12);
        assert_eq!(panel.records[0].get(D_DEPOSIT_SPREAD), None);
    }

    #[test]
    fn test_deposit_rate_zero_deposits_is_missing() {
        let r = Record::new(1, 2000, 1)
            .with(INTEREST_EXPENSE, 1.0)
            .with(DEPOSITS, 0.0);
        let mut panel = Panel::new(vec![], vec![r]);
        compute_rates_and_spread(&mut panel);
        assert_eq!(panel.records[0].get(DEPOSIT_RATE), None);
    }

    #[test]
    fn test_growth_flag_sequence() {
        let values = [Some(100.0), Some(100.0), Some(210.0), Some(150.0)];
        let mut panel = Panel::new(
            vec![TOTAL_ASSETS.to_string()],
            series(1, TOTAL_ASSETS, &values),
        );

        compute_growth_flag(&mut panel, 1.0);

        assert_eq!(
            panel.column(HIGH_GROWTH),
            vec![Some(0.0), Some(0.0), Some(1.0), Some(0.0)]
        );
    }

    #[test]
    fn test_growth_flag_false_without_prior_value() {
        let values = [None, Some(500.0), Some(400.0)];
        let mut panel = Panel::new(
            vec![TOTAL_ASSETS.to_string()],
            series(1, TOTAL_ASSETS, &values),
        );

        compute_growth_flag(&mut panel, 1.0);

        assert_eq!(panel.column(HIGH_GROWTH), vec![Some(0.0); 3]);
    }

    #[test]
    fn test_log_difference_per_bank() {
        let mut records = series(1, "cash", &[Some(10.0), Some(20.0), Some(-5.0), Some(40.0)]);
        records.extend(series(2, "cash", &[Some(3.0), Some(6.0)]));
        let mut panel = Panel::new(vec!["cash".to_string()], records);

        let suppressed = log_difference(&mut panel, &["cash".to_string()]).unwrap();

        assert_eq!(suppressed.get("cash"), Some(&1));
        assert!(!panel.has_column("cash"));
        assert!(panel.has_column("d_cash"));

        let d = panel.column("d_cash");
        assert_eq!(d[0], None);
        assert!((d[1].unwrap() - (20.0f64.ln() - 10.0f64.ln())).abs() < 1e-12);
        assert_eq!(d[2], None);
        assert_eq!(d[3], None);
        // Second bank starts fresh.
        assert_eq!(d[4], None);
        assert!((d[5].unwrap() - 2.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_log_difference_unknown_variable() {
        let mut panel = Panel::new(vec![], vec![]);
        let err = log_difference(&mut panel, &["missing".to_string()]).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownColumn(_)));
    }

    #[test]
    fn test_wholesale_funding_after_rename() {
        let r = Record::new(1, 2000, 1)
            .with("liabilities", 90.0)
            .with("deposits", 70.0);
        let mut panel = Panel::new(vec!["liabilities".to_string(), "deposits".to_string()], vec![r]);

        rename_columns(&mut panel, &crate::config::VariablesConfig::default().renames);
        compute_wholesale_funding(&mut panel);

        assert_eq!(panel.records[0].get(WHOLESALE_FUNDING), Some(20.0));
        assert!(panel.has_column(TOTAL_LIABILITIES));
    }

    #[test]
    fn test_integer_convertible_columns() {
        let mut a = Record::new(1, 2000, 1).with("assets", 100.0).with("ratio", 0.5);
        a.chartertype = Some(200.0);
        a.cert = Some(10);
        let b = Record::new(1, 2000, 2).with("assets", 250.0);
        let mut panel = Panel::new(
            vec!["assets".to_string(), "ratio".to_string(), "empty".to_string()],
            vec![a, b],
        );
        panel.set_column("empty", vec![None, None]);

        let columns = integer_convertible_columns(&panel);
        assert_eq!(
            columns,
            vec!["rssdid", "cert", "chartertype", "year", "quarter", "assets"]
        );
    }
}
