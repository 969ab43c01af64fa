//! LaTeX rendering of composite tables.

use super::composite::{Composite, CompositeRow};
use super::CompositeKind;

const BANK_FE_HEADER: &str = r"\makecell[c]{Bank\\f.e.}";
const QUARTER_FE_HEADER: &str = r"\makecell[c]{Quarter\\f.e.}";
const POST_FE_HEADER: &str = r"\makecell[c]{Bank $\times$\\2008 f.e.}";

/// Column spec and total column count for `k` model columns.
fn layout(kind: CompositeKind, k: usize) -> (String, usize) {
    match kind {
        CompositeKind::FixedEffects => ("c".repeat(3 + k), 3 + k),
        CompositeKind::Filters | CompositeKind::Robustness => {
            (format!("l{}c", "c".repeat(k)), k + 2)
        }
    }
}

fn header_rows(composite: &Composite) -> [String; 2] {
    let vars = composite.header_vars.join(" & ");
    let nums = composite.header_nums.join(" & ");
    match composite.kind {
        CompositeKind::Filters => [
            format!(r"   Filter & {} & Obs.\\", vars),
            format!(r"          & {} & \\", nums),
        ],
        CompositeKind::Robustness => [
            format!(r"   Sample & {} & Obs.\\", vars),
            format!(r"          & {} & \\", nums),
        ],
        CompositeKind::FixedEffects => [
            format!(
                r"   {} & {} & {} & {}\\",
                BANK_FE_HEADER, QUARTER_FE_HEADER, POST_FE_HEADER, vars
            ),
            format!(r"           &               &                    & {}\\", nums),
        ],
    }
}

fn body_row(row: &CompositeRow) -> String {
    let mut line = format!("   {} & {}", row.lead.join(" & "), row.cells.join(" & "));
    if let Some(obs) = &row.observations {
        line.push_str(" & ");
        line.push_str(obs);
    }
    line.push_str(r"\\");
    line
}

/// Render a composite as a self-contained table block. No trailing newline.
pub fn render_composite(composite: &Composite, interaction_label: &str) -> String {
    let (col_spec, n_cols) = layout(composite.kind, composite.header_vars.len());

    let mut lines = vec![
        r"\begingroup".to_string(),
        r"\centering".to_string(),
        format!(
            r"\begin{{tabular*}}{{\textwidth}}{{@{{\extracolsep{{\fill}}}}{}@{{}}}}",
            col_spec
        ),
        r"   \toprule".to_string(),
    ];
    lines.extend(header_rows(composite));
    lines.push(r"   \midrule".to_string());
    lines.push(format!(
        r"   \multicolumn{{{}}}{{c}}{{{}}}\\",
        n_cols, interaction_label
    ));
    lines.push(r"   \midrule".to_string());
    lines.extend(composite.rows.iter().map(body_row));
    lines.push(r"   \bottomrule".to_string());
    lines.push(r"\end{tabular*}".to_string());
    lines.push(r"\par\endgroup".to_string());

    lines.join("\n")
}
