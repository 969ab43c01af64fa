//! Splitting a LaTeX table row into cells.

/// Stand-in for an escaped ampersand while the row is split.
const SHIELD: &str = "\u{0}AMP\u{0}";

/// Row terminator stripped from the last cell.
const ROW_END: &str = r"\\";

/// Split a row such as `Observations & 4,848 & 4,848 \\` into its cells.
///
/// Escaped separators (`\&`) stay inside their cell. The label cell is
/// dropped when `skip_label` is set, and cells that are empty after trimming
/// are dropped too, so the result is not positionally aligned with the
/// source columns.
pub fn extract_cells(line: &str, skip_label: bool) -> Vec<String> {
    let shielded = line.replace(r"\&", SHIELD);
    let parts: Vec<&str> = shielded.split('&').collect();
    let last = parts.len().saturating_sub(1);

    parts
        .iter()
        .enumerate()
        .skip(usize::from(skip_label))
        .filter_map(|(i, part)| {
            let mut cell = part.trim_end();
            if i == last {
                if let Some(stripped) = cell.strip_suffix(ROW_END) {
                    cell = stripped.trim_end();
                }
            }
            let cell = cell.replace(SHIELD, r"\&");
            let cell = cell.trim();
            (!cell.is_empty()).then(|| cell.to_string())
        })
        .collect()
}
