//! Rendering of store results for the command line.

use serde_json::json;

use crate::repos::counter_rows::CounterRow;
use crate::store::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    /// One `<br />`-terminated line per field
    Html,
    Json,
}

pub fn render_snapshot(snapshot: &Snapshot, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!(
            "Last counter: {}\nRow count: {}",
            snapshot.last_value, snapshot.row_count
        ),
        OutputFormat::Html => format!(
            "Last counter: {}<br />\nRow count: {}<br />",
            snapshot.last_value, snapshot.row_count
        ),
        OutputFormat::Json => json!(snapshot).to_string(),
    }
}

pub fn render_value(value: i64, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => value.to_string(),
        OutputFormat::Html => format!("Next counter: {value}<br />"),
        OutputFormat::Json => json!({ "value": value }).to_string(),
    }
}

pub fn render_rows(rows: &[CounterRow], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => rows
            .iter()
            .map(|r| format!("{}\t{}", r.id, r.value))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Html => rows
            .iter()
            .map(|r| format!("{}: {}<br />", r.id, r.value))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => json!(rows).to_string(),
    }
}
