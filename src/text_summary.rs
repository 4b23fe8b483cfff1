//! Text summary builder for CLI output.
//!
//! Renders a processed run through the result views its demo enables, plus the ticket
//! correlation panel.

use crate::config::{DemoConfig, ResultView};
use crate::model::{Correlation, ProcessedRun, ResultRow, ResultTable, RunRecord};
use serde_json::Value;

const MAX_CELL_WIDTH: usize = 40;
const BREACH_FIELDS: [&str; 2] = ["sla_breached", "breached"];

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_text_summary(processed: &ProcessedRun, config: &DemoConfig) -> TextSummary {
    let mut lines = Vec::new();
    let record = &processed.record;
    let result = &processed.result;

    let mut header = format!("Run {} ({})", record.id, record.status);
    if let Some(elapsed) = record.elapsed() {
        header.push_str(&format!(" in {:.1}s", elapsed.as_secs_f64()));
    }
    lines.push(header);
    if !record.tools_used.is_empty() {
        lines.push(format!("Tools: {}", record.tools_used.join(", ")));
    }

    if let Some(err) = result.error.as_deref() {
        lines.push(format!("Run failed: {err}"));
        return TextSummary { lines };
    }
    if result.is_empty() {
        lines.push("No result available".into());
        return TextSummary { lines };
    }

    if config.shows(ResultView::Markdown) {
        if let Some(md) = result.markdown.as_deref() {
            lines.push(String::new());
            lines.extend(md.lines().map(str::to_string));
        }
    }
    if let Some(table) = result.table.as_ref() {
        if config.shows(ResultView::Table) {
            lines.push(String::new());
            lines.extend(render_table(&table.columns, &table.rows));
        }
        if config.shows(ResultView::SlaBreach) {
            lines.push(String::new());
            lines.extend(sla_breach_lines(table));
        }
    }

    if !result.ticket_ids.is_empty() {
        lines.push(String::new());
        lines.extend(correlation_lines(&processed.correlation));
    }

    TextSummary { lines }
}

/// One line per run, most recent first.
pub(crate) fn history_lines(runs: &[RunRecord]) -> Vec<String> {
    if runs.is_empty() {
        return vec!["No recent runs".into()];
    }
    runs.iter()
        .map(|r| {
            let when = r.created_at.as_deref().unwrap_or("-");
            format!(
                "{:<12} {:<10} {:<25} {}",
                r.id,
                r.status,
                when,
                truncate(r.prompt.trim(), 60)
            )
        })
        .collect()
}

fn correlation_lines(c: &Correlation) -> Vec<String> {
    let mut lines = vec![format!("Tickets: {}", c.summary())];
    for r in &c.references {
        let fields: Vec<String> = r
            .fields
            .iter()
            .map(|f| format!("{}: {}", f.name, cell_text(&f.value)))
            .collect();
        if fields.is_empty() {
            lines.push(format!("  {}", r.id));
        } else {
            lines.push(format!("  {}  {}", r.id, fields.join(" | ")));
        }
    }
    if c.is_partial() {
        lines.push(format!("  not found: {}", c.failed.join(", ")));
    }
    lines
}

fn sla_breach_lines(table: &ResultTable) -> Vec<String> {
    let breached: Vec<ResultRow> = table
        .rows
        .iter()
        .filter(|row| is_breached(row))
        .cloned()
        .collect();
    let mut lines = vec![format!(
        "SLA breaches: {} of {} rows",
        breached.len(),
        table.rows.len()
    )];
    if !breached.is_empty() {
        lines.extend(render_table(&table.columns, &breached));
    }
    lines
}

fn is_breached(row: &ResultRow) -> bool {
    BREACH_FIELDS
        .iter()
        .filter_map(|f| row.get(*f))
        .any(|v| match v {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
            Value::String(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "y" | "1"
            ),
            _ => false,
        })
}

fn render_table(columns: &[String], rows: &[ResultRow]) -> Vec<String> {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| truncate(&row.get(c).map(cell_text).unwrap_or_default(), MAX_CELL_WIDTH))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let fmt_row = |vals: &[String]| -> String {
        vals.iter()
            .zip(&widths)
            .map(|(v, &w)| format!("{v:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![fmt_row(columns)];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    lines.extend(cells.iter().map(|r| fmt_row(r)));
    lines
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => "-".into(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(cell_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max.saturating_sub(1)).collect();
        t.push('…');
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemoRegistry;
    use crate::model::{ExtractedResult, RunStatus, TicketField, TicketReference};
    use serde_json::json;

    fn processed(result: ExtractedResult, correlation: Correlation) -> ProcessedRun {
        let mut record = RunRecord::queued("run-1", "mock prompt");
        record.status = if result.error.is_some() {
            RunStatus::Error
        } else {
            RunStatus::Completed
        };
        ProcessedRun {
            demo_id: "usecase-demo".into(),
            record,
            result,
            correlation,
        }
    }

    fn rows(v: Value) -> Vec<ResultRow> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn error_shows_message_verbatim() {
        let cfg = DemoRegistry::builtin().get("usecase-demo").unwrap().clone();
        let p = processed(
            ExtractedResult {
                error: Some("executor timeout".into()),
                ..Default::default()
            },
            Correlation::default(),
        );
        let s = build_text_summary(&p, &cfg);
        assert_eq!(s.lines.last().unwrap(), "Run failed: executor timeout");
    }

    #[test]
    fn empty_result_is_displayable() {
        let cfg = DemoRegistry::builtin().get("usecase-demo").unwrap().clone();
        let s = build_text_summary(
            &processed(ExtractedResult::default(), Correlation::default()),
            &cfg,
        );
        assert_eq!(s.lines.last().unwrap(), "No result available");
    }

    #[test]
    fn table_and_partial_correlation() {
        let cfg = DemoRegistry::builtin().get("usecase-demo").unwrap().clone();
        let p = processed(
            ExtractedResult {
                table: Some(ResultTable {
                    columns: vec!["project_name".into(), "ticket_ids".into()],
                    rows: rows(json!([{ "project_name": "Auto Assignment Optimizer", "ticket_ids": "ticket-1, ticket-2" }])),
                }),
                ticket_ids: vec!["ticket-1".into(), "ticket-2".into()],
                ..Default::default()
            },
            Correlation {
                references: vec![TicketReference {
                    id: "ticket-2".into(),
                    fields: vec![TicketField {
                        name: "summary".into(),
                        value: json!("Printer offline"),
                    }],
                }],
                failed: vec!["ticket-1".into()],
            },
        );
        let s = build_text_summary(&p, &cfg);
        assert!(s.lines.iter().any(|l| l.starts_with("project_name")));
        assert!(s.lines.contains(&"Tickets: 1 of 2 tickets resolved".to_string()));
        assert!(s.lines.contains(&"  ticket-2  summary: Printer offline".to_string()));
        assert!(s.lines.contains(&"  not found: ticket-1".to_string()));
    }

    #[test]
    fn sla_view_counts_breaches() {
        let cfg = DemoRegistry::builtin().get("sla-breach").unwrap().clone();
        let p = processed(
            ExtractedResult {
                table: Some(ResultTable {
                    columns: vec!["ticket_id".into(), "sla_breached".into()],
                    rows: rows(json!([
                        { "ticket_id": "a", "sla_breached": true },
                        { "ticket_id": "b", "sla_breached": "no" },
                        { "ticket_id": "c", "breached": "Yes" }
                    ])),
                }),
                ..Default::default()
            },
            Correlation::default(),
        );
        let s = build_text_summary(&p, &cfg);
        assert!(s.lines.contains(&"SLA breaches: 2 of 3 rows".to_string()));
        // The sla-breach demo does not enable the plain table view.
        assert_eq!(s.lines.iter().filter(|l| l.starts_with("ticket_id")).count(), 1);
    }

    #[test]
    fn history_lines_truncate_prompts() {
        let mut r = RunRecord::queued("run-1", "x".repeat(100));
        r.created_at = Some("2024-05-01T10:00:00Z".into());
        let lines = history_lines(&[r]);
        assert!(lines[0].ends_with('…'));
        assert_eq!(history_lines(&[]), vec!["No recent runs".to_string()]);
    }
}
