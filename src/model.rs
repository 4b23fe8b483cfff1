use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// One row of a tabular run result, keyed by column name.
pub type ResultRow = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Error)
    }

    /// Whether the executor reporting `next` after `self` is a forward move.
    /// Terminal states never transition; `running` never returns to `queued`.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match self {
            RunStatus::Queued => true,
            RunStatus::Running => next != RunStatus::Queued,
            RunStatus::Completed | RunStatus::Error => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Treat an explicit JSON `null` the same as an absent field.
fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// A single background agent run as reported by the run executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    #[serde(default)]
    pub prompt: String,
    pub status: RunStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub result_markdown: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub result_rows: Vec<ResultRow>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub result_columns: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    // Any other top-level fields the executor attaches (e.g. `ticket_ids`).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RunRecord {
    #[cfg(test)]
    pub fn queued(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            status: RunStatus::Queued,
            created_at: None,
            started_at: None,
            completed_at: None,
            tools_used: Vec::new(),
            result_markdown: None,
            result_rows: Vec::new(),
            result_columns: Vec::new(),
            error: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_markdown(&self) -> bool {
        self.result_markdown
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty())
    }

    /// Describe how a terminal record breaks the payload invariant, if it does.
    pub fn payload_violation(&self) -> Option<&'static str> {
        match self.status {
            RunStatus::Completed if !self.has_markdown() && self.result_rows.is_empty() => {
                Some("completed run carries neither markdown nor rows")
            }
            RunStatus::Completed if self.error.is_some() => Some("completed run carries an error"),
            RunStatus::Error if self.error.is_none() => Some("error run has no error message"),
            RunStatus::Error if !self.result_rows.is_empty() => Some("error run carries rows"),
            _ => None,
        }
    }

    /// Wall time between `started_at` and `completed_at`, when both parse as RFC 3339.
    pub fn elapsed(&self) -> Option<Duration> {
        let start = parse_timestamp(self.started_at.as_deref()?)?;
        let end = parse_timestamp(self.completed_at.as_deref()?)?;
        (end - start).try_into().ok()
    }
}

fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).ok()
}

/// A single named field copied from a ticket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketField {
    pub name: String,
    pub value: serde_json::Value,
}

/// A ticket identifier resolved against the ticket dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketReference {
    pub id: String,
    /// Display fields in the order the demo lists them; fields missing on the ticket are skipped.
    pub fields: Vec<TicketField>,
}

#[cfg(test)]
impl TicketReference {
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
}

/// Display-ready payload derived from a terminal run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedResult {
    pub table: Option<ResultTable>,
    pub markdown: Option<String>,
    pub ticket_ids: Vec<String>,
    pub error: Option<String>,
}

impl ExtractedResult {
    /// A successful run that produced nothing displayable.
    pub fn is_empty(&self) -> bool {
        self.error.is_none() && self.table.is_none() && self.markdown.is_none()
    }
}

/// Outcome of resolving a set of ticket ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Correlation {
    pub references: Vec<TicketReference>,
    pub failed: Vec<String>,
}

impl Correlation {
    pub fn requested(&self) -> usize {
        self.references.len() + self.failed.len()
    }

    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} of {} tickets resolved",
            self.references.len(),
            self.requested()
        )
    }
}

/// A terminal run with its extracted result and resolved tickets.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedRun {
    pub demo_id: String,
    pub record: RunRecord,
    pub result: ExtractedResult,
    pub correlation: Correlation,
}

#[derive(Debug, Clone, Serialize)]
pub enum RunEvent {
    HistoryLoaded {
        runs: Vec<RunRecord>,
    },
    Submitted {
        record: RunRecord,
    },
    SubmissionFailed {
        message: String,
    },
    StatusChanged {
        record: RunRecord,
    },
    RunFinished {
        // Box to keep RunEvent small; ProcessedRun carries the whole payload.
        processed: Box<ProcessedRun>,
    },
    Info(InfoEvent),
}

/// Structured info events emitted by the controller and consumed by CLI layers.
#[derive(Debug, Clone, Serialize)]
pub enum InfoEvent {
    PollFault { run_id: String, message: String },
    Cancelled { run_id: String },
    PollAttemptsExhausted { run_id: String, attempts: u32 },
}

impl InfoEvent {
    /// Render a human-readable message for CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::PollFault { run_id, message } => {
                format!("Poll for {run_id} failed, retrying: {message}")
            }
            InfoEvent::Cancelled { run_id } => format!("Stopped tracking run {run_id}"),
            InfoEvent::PollAttemptsExhausted { run_id, attempts } => format!(
                "Gave up polling run {run_id} after {attempts} attempts; it may still be running"
            ),
        }
    }
}
