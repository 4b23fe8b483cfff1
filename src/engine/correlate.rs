use crate::engine::client::TicketLookup;
use crate::error::LookupError;
use crate::model::{Correlation, TicketField, TicketReference};
use futures::{stream, StreamExt};
use std::collections::HashSet;

/// Upper bound on concurrent ticket lookups for one correlation.
const MAX_CONCURRENT_LOOKUPS: usize = 8;

/// Resolve `ticket_ids` against the ticket dataset.
///
/// Lookups run concurrently; references come back in input order. Ids that fail to resolve
/// (not found or transport error) are listed in `Correlation::failed` instead. With no
/// `display_fields` every ticket field is kept.
pub async fn resolve(
    lookup: &dyn TicketLookup,
    ticket_ids: &[String],
    display_fields: &[String],
) -> Correlation {
    let mut seen = HashSet::new();
    let ids: Vec<String> = ticket_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();

    // Boxed: the unboxed stream is not `Send` for every lifetime and cannot be spawned.
    let outcomes: Vec<_> = stream::iter(ids)
        .map(|id| async move {
            let outcome = lookup.fetch_ticket(&id).await;
            (id, outcome)
        })
        .buffered(MAX_CONCURRENT_LOOKUPS)
        .boxed()
        .collect()
        .await;

    let mut correlation = Correlation::default();
    for (id, outcome) in outcomes {
        match outcome {
            Ok(ticket) => correlation.references.push(TicketReference {
                id,
                fields: select_fields(&ticket, display_fields),
            }),
            Err(e) => {
                match &e {
                    LookupError::NotFound(_) => tracing::debug!(ticket_id = %id, "{e}"),
                    LookupError::Transport { .. } => tracing::warn!(ticket_id = %id, "{e}"),
                }
                correlation.failed.push(id);
            }
        }
    }
    if correlation.is_partial() {
        tracing::info!(failed = correlation.failed.len(), "{}", correlation.summary());
    }
    correlation
}

fn select_fields(ticket: &serde_json::Value, display_fields: &[String]) -> Vec<TicketField> {
    let Some(obj) = ticket.as_object() else {
        return Vec::new();
    };
    if display_fields.is_empty() {
        return obj
            .iter()
            .map(|(name, value)| TicketField {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
    }
    display_fields
        .iter()
        .filter_map(|name| {
            obj.get(name).map(|value| TicketField {
                name: name.clone(),
                value: value.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::StaticTickets;
    use serde_json::json;
    use std::time::Duration;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn resolves_with_display_fields() {
        let tickets = StaticTickets::default().with(
            "ticket-1",
            json!({ "id": "ticket-1", "summary": "VPN Failure on Remote Access", "priority": "P1", "raw": "x" }),
        );
        let c = resolve(&tickets, &ids(&["ticket-1"]), &ids(&["summary", "priority", "sla_due"])).await;

        assert!(!c.is_partial());
        let r = &c.references[0];
        assert_eq!(r.id, "ticket-1");
        assert_eq!(r.field("summary"), Some(&json!("VPN Failure on Remote Access")));
        assert_eq!(r.fields.len(), 2);
        assert_eq!(r.field("raw"), None);
    }

    #[tokio::test]
    async fn not_found_is_reported_not_fatal() {
        let tickets = StaticTickets::default().with("ticket-2", json!({ "summary": "Printer offline" }));
        let c = resolve(&tickets, &ids(&["ticket-1", "ticket-2"]), &ids(&["summary"])).await;

        assert_eq!(c.references.len(), 1);
        assert_eq!(c.references[0].id, "ticket-2");
        assert_eq!(c.failed, vec!["ticket-1"]);
        assert!(c.is_partial());
        assert_eq!(c.summary(), "1 of 2 tickets resolved");
    }

    #[tokio::test(start_paused = true)]
    async fn order_follows_input_not_completion() {
        let mut tickets = StaticTickets::default()
            .with("slow", json!({ "summary": "slow" }))
            .with("fast", json!({ "summary": "fast" }));
        tickets.delays.insert("slow".into(), Duration::from_secs(5));
        tickets.broken.insert("flaky".into());

        let c = resolve(&tickets, &ids(&["slow", "flaky", "fast"]), &[]).await;
        let got: Vec<_> = c.references.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(got, ["slow", "fast"]);
        assert_eq!(c.failed, vec!["flaky"]);
    }

    #[tokio::test]
    async fn resolved_and_failed_are_disjoint_and_bounded() {
        let tickets = StaticTickets::default().with("a", json!({}));
        let input = ids(&["a", "b", "a", "c"]);
        let c = resolve(&tickets, &input, &[]).await;

        assert!(c.references.len() + c.failed.len() <= input.len());
        for r in &c.references {
            assert!(!c.failed.contains(&r.id));
        }
        assert_eq!(c.failed, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn resolves_inside_a_spawned_task() {
        let tickets = std::sync::Arc::new(
            StaticTickets::default().with("ticket-7", json!({ "summary": "Disk full" })),
        );
        let handle = tokio::spawn(async move {
            let lookup: &dyn TicketLookup = tickets.as_ref();
            resolve(lookup, &ids(&["ticket-7", "ticket-8"]), &ids(&["summary"])).await
        });
        let c = handle.await.unwrap();
        assert_eq!(c.references[0].id, "ticket-7");
        assert_eq!(c.failed, vec!["ticket-8"]);
    }

    #[tokio::test]
    async fn resolving_twice_is_idempotent() {
        let tickets = StaticTickets::default()
            .with("a", json!({ "summary": "A" }))
            .with("b", json!({ "summary": "B" }));
        let input = ids(&["b", "x", "a"]);
        let fields = ids(&["summary"]);
        assert_eq!(
            resolve(&tickets, &input, &fields).await,
            resolve(&tickets, &input, &fields).await
        );
    }
}
