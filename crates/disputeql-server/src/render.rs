//! Text rendering of query results for tool responses

use disputeql_exec::{GroupedSeries, QueryOutput};
use disputeql_frame::{DataFrame, Value};

/// Rows shown before a table or list is truncated
pub const MAX_DISPLAY_ROWS: usize = 50;

const BAR_WIDTH: usize = 40;

fn cell(value: &Value) -> String {
    value.to_string().replace('|', "\\|").replace('\n', " ")
}

fn truncation_note(total: usize) -> String {
    if total > MAX_DISPLAY_ROWS {
        format!("\n... {} more rows\n", total - MAX_DISPLAY_ROWS)
    } else {
        String::new()
    }
}

/// Markdown grid
pub fn render_table(df: &DataFrame) -> String {
    if df.width() == 0 {
        return "(empty table)\n".to_string();
    }

    let mut out = format!("| {} |\n", df.column_names().join(" | "));
    out.push_str(&format!("|{}\n", "---|".repeat(df.width())));

    for row in 0..df.height().min(MAX_DISPLAY_ROWS) {
        let cells: Vec<String> = df.columns().iter().map(|c| cell(&c.values[row])).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    out.push_str(&truncation_note(df.height()));
    out.push_str(&format!("\n{} rows × {} columns\n", df.height(), df.width()));
    out
}

/// Horizontal bar chart; falls back to a two-column grid for non-numeric values
pub fn render_bar_chart(grouped: &GroupedSeries) -> String {
    let numbers: Option<Vec<f64>> = grouped.values.iter().map(Value::as_f64).collect();
    let Some(numbers) = numbers else {
        let mut out = format!("| {} | {} |\n|---|---|\n", grouped.keys.join(", "), grouped.name);
        for (i, value) in grouped.values.iter().enumerate() {
            out.push_str(&format!("| {} | {} |\n", grouped.label_text(i), cell(value)));
        }
        return out;
    };

    let labels: Vec<String> = (0..grouped.len()).map(|i| grouped.label_text(i)).collect();
    let label_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let max = numbers.iter().cloned().fold(0.0_f64, f64::max);

    let mut out = format!("{} by {}\n\n", grouped.name, grouped.keys.join(", "));
    for ((label, number), value) in labels.iter().zip(&numbers).zip(&grouped.values) {
        let len = if max > 0.0 {
            ((number.max(0.0) / max) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        out.push_str(&format!(
            "{:<width$} | {} {}\n",
            label,
            "█".repeat(len),
            value,
            width = label_width
        ));
    }
    out
}

pub fn render_list(name: &str, values: &[Value]) -> String {
    let mut out = if name.is_empty() {
        String::new()
    } else {
        format!("{}:\n", name)
    };
    for value in values.iter().take(MAX_DISPLAY_ROWS) {
        out.push_str(&format!("- {}\n", value));
    }
    out.push_str(&truncation_note(values.len()));
    out
}

/// Render any result by its shape
pub fn render(output: &QueryOutput) -> String {
    match output {
        QueryOutput::Table(df) => render_table(df),
        QueryOutput::Grouped(grouped) => render_bar_chart(grouped),
        QueryOutput::Series(column) => render_list(&column.name, &column.values),
        QueryOutput::Scalar(value) => format!("{}\n", value),
    }
}
