//! Derive display payload and ticket identifiers from a terminal run.

use crate::config::DemoConfig;
use crate::model::{ExtractedResult, ResultRow, ResultTable, RunRecord, RunStatus};
use serde_json::Value;
use std::collections::HashSet;

const MISSING_ERROR_MESSAGE: &str = "run failed without an error message";

/// Pure function of the record and the demo config.
pub fn extract(record: &RunRecord, config: &DemoConfig) -> ExtractedResult {
    if record.status == RunStatus::Error {
        return ExtractedResult {
            error: Some(
                record
                    .error
                    .clone()
                    .unwrap_or_else(|| MISSING_ERROR_MESSAGE.to_string()),
            ),
            ..Default::default()
        };
    }

    let markdown = record
        .has_markdown()
        .then(|| record.result_markdown.clone())
        .flatten();
    let table = (!record.result_rows.is_empty()).then(|| ResultTable {
        columns: table_columns(record),
        rows: record.result_rows.clone(),
    });

    ExtractedResult {
        table,
        markdown,
        ticket_ids: ticket_ids(record, &config.ticket_id_fields),
        error: None,
    }
}

/// Declared column order, or first-seen key order across rows when none is declared.
fn table_columns(record: &RunRecord) -> Vec<String> {
    if !record.result_columns.is_empty() {
        return record.result_columns.clone();
    }
    let mut seen = HashSet::new();
    record
        .result_rows
        .iter()
        .flat_map(|row| row.keys())
        .filter(|k| seen.insert(k.as_str()))
        .cloned()
        .collect()
}

/// Ticket ids from every row, then from the record's top-level fields; trimmed, de-duplicated,
/// first-seen order.
pub fn ticket_ids(record: &RunRecord, fields: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let sources = record
        .result_rows
        .iter()
        .chain(std::iter::once(&record.extra));
    for source in sources {
        for id in first_configured_ids(source, fields) {
            if seen.insert(id.clone()) {
                out.push(id);
            }
        }
    }
    out
}

fn first_configured_ids(row: &ResultRow, fields: &[String]) -> Vec<String> {
    fields
        .iter()
        .filter_map(|f| row.get(f))
        .map(split_ids)
        .find(|ids| !ids.is_empty())
        .unwrap_or_default()
}

fn split_ids(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items.iter().flat_map(split_ids).collect(),
        _ => Vec::new(),
    }
}
