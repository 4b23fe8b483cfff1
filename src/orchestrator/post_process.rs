//! Post-run processing utilities.
//!
//! Turns a terminal run into a display-ready result: extraction, then ticket correlation.

use crate::config::DemoConfig;
use crate::engine::{correlate, extract, TicketLookup};
use crate::model::{Correlation, ProcessedRun, RunRecord};

/// Process a terminal run: extract its payload and resolve the ticket ids it mentions.
pub(crate) async fn process_run_completion(
    config: &DemoConfig,
    lookup: &dyn TicketLookup,
    record: RunRecord,
) -> ProcessedRun {
    let result = extract::extract(&record, config);

    let correlation = if result.ticket_ids.is_empty() {
        Correlation::default()
    } else {
        correlate::resolve(lookup, &result.ticket_ids, &config.ticket_display_fields).await
    };

    if result.is_empty() {
        tracing::info!(run_id = %record.id, "completed run has no displayable result");
    }

    ProcessedRun {
        demo_id: config.id.clone(),
        record,
        result,
        correlation,
    }
}
