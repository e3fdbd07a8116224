//! Plain-text rendering for the terminal
//!
//! Every function here is a pure mapping from client state to a string; the
//! binary decides where the text goes.

use fbq_common::events::AttemptRecord;
use serde_json::{Map, Value};

use crate::feedback::{facet_label, FacetOptions, FeedbackQueryState};
use crate::models::DisplayResponse;
use crate::transcript::Transcript;

/// Widest a table cell may render before it is truncated
const MAX_CELL_WIDTH: usize = 48;

/// Transcript view: latest line only, or the full numbered list
pub fn render_transcript(transcript: &Transcript, expanded: bool) -> Option<String> {
    if expanded {
        let lines = transcript.expanded_view();
        (!lines.is_empty()).then(|| lines.join("\n"))
    } else {
        transcript.collapsed_view()
    }
}

/// All facets of a response, text first, then image, then table
pub fn render_response(response: &DisplayResponse) -> String {
    let mut blocks = Vec::new();

    if let Some(text) = &response.text {
        blocks.push(text.clone());
    }

    if let Some(image) = &response.image {
        let size = image
            .decode()
            .map(|bytes| format!("{} bytes", bytes.len()))
            .unwrap_or_else(|_| "undecodable".to_string());
        blocks.push(format!("[image: {}, {}]", image.mime_type(), size));
    }

    if let Some(rows) = response.table.as_ref().filter(|rows| !rows.is_empty()) {
        blocks.push(render_table(&response.table_columns(), rows));
    }

    if let Some(metadata) = &response.metadata {
        let notes: Vec<String> = [
            metadata.source.as_deref().map(|s| format!("source: {}", s)),
            metadata.details.clone(),
        ]
        .into_iter()
        .flatten()
        .filter(|note| !note.is_empty())
        .collect();
        if !notes.is_empty() {
            blocks.push(format!("({})", notes.join("; ")));
        }
    }

    if blocks.is_empty() {
        return "(empty response)".to_string();
    }
    blocks.join("\n\n")
}

/// Aligned table; missing cells render empty
pub fn render_table(columns: &[String], rows: &[Map<String, Value>]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| row.get(column).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(value, width)| pad(value, *width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format_row(columns));
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    lines.extend(cells.iter().map(|row| format_row(row)));
    lines.join("\n")
}

fn cell_text(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.replace('\n', " "),
        other => other.to_string(),
    };
    if text.chars().count() > MAX_CELL_WIDTH {
        let cut: String = text.chars().take(MAX_CELL_WIDTH - 1).collect();
        format!("{}…", cut)
    } else {
        text
    }
}

fn pad(value: &str, width: usize) -> String {
    let len = value.chars().count();
    format!("{}{}", value, " ".repeat(width.saturating_sub(len)))
}

/// Developer view of the backend's attempt history
pub fn render_history(history: &[AttemptRecord]) -> String {
    if history.is_empty() {
        return "No attempt history".to_string();
    }

    history
        .iter()
        .map(|record| {
            let status = match &record.error {
                Some(error) => format!("failed: {}", error),
                None => "ok".to_string(),
            };
            let code = record
                .code
                .lines()
                .map(|line| format!("    {}", line))
                .collect::<Vec<_>>()
                .join("\n");
            format!("Attempt {} ({})\n{}", record.attempt, status, code)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Feedback table, or the status line that replaces it
pub fn render_feedback(state: &FeedbackQueryState) -> String {
    if state.is_loading() {
        return "Loading feedbacks…".to_string();
    }
    if let Some(error) = state.error() {
        return error.to_string();
    }
    if state.rows().is_empty() {
        return "No feedbacks found".to_string();
    }
    format!(
        "{}\n\n{} feedbacks",
        render_table(&state.columns(), state.rows()),
        state.rows().len()
    )
}

/// Available filter values
pub fn render_facets(facets: &FacetOptions) -> String {
    let list = |values: &[Value]| {
        if values.is_empty() {
            "-".to_string()
        } else {
            values.iter().map(facet_label).collect::<Vec<_>>().join(", ")
        }
    };
    format!(
        "office:  {}\nservice: {}\nlevel:   {}",
        list(&facets.offices),
        list(&facets.services),
        list(&facets.levels)
    )
}
