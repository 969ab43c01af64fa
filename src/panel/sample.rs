//! Sample restriction at the start and end of panel preparation.

use crate::config::SampleConfig;
use crate::models::Panel;
use tracing::{debug, info};

/// Post-cutoff indicator column.
pub const POST_CUTOFF: &str = "post2008";

/// Keep one institutional type, fix known-bad certificates, and bound the
/// working year range.
pub fn restrict_sample(panel: &mut Panel, sample: &SampleConfig) {
    let before = panel.len();
    panel
        .records
        .retain(|r| r.chartertype == Some(sample.charter_type));
    let after_type = panel.len();

    for fix in &sample.cert_fixes {
        let mut fixed = 0usize;
        for record in panel.records.iter_mut().filter(|r| r.rssdid == fix.rssdid) {
            record.cert = Some(fix.cert);
            fixed += 1;
        }
        debug!(rssdid = fix.rssdid, cert = fix.cert, fixed, "applied certificate fix");
    }

    panel
        .records
        .retain(|r| (sample.first_year..=sample.last_year).contains(&r.year));

    info!(
        before,
        after_type,
        after_years = panel.len(),
        "restricted sample"
    );
}

/// Flag post-cutoff years and trim to the final regression window.
pub fn finalize(panel: &mut Panel, sample: &SampleConfig) {
    let flags = panel
        .records
        .iter()
        .map(|r| Some(if r.year >= sample.post_cutoff_year { 1.0 } else { 0.0 }))
        .collect();
    panel.set_column(POST_CUTOFF, flags);

    panel
        .records
        .retain(|r| (sample.final_first_year..=sample.final_last_year).contains(&r.year));
    info!(rows = panel.len(), "trimmed to final window");
}
