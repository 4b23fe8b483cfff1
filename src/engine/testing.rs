//! In-memory executor and ticket store for unit tests.

use crate::engine::client::{RunExecutor, TicketLookup};
use crate::error::{LookupError, RunError};
use crate::model::RunRecord;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct ExecutorState {
    next_id: u32,
    created: Vec<String>,
    create_failure: Option<String>,
    fetches: HashMap<String, VecDeque<Result<RunRecord, RunError>>>,
    fetch_counts: HashMap<String, u32>,
    listing: Option<Result<Vec<RunRecord>, RunError>>,
}

/// Executor whose create/fetch/list answers are scripted by the test.
#[derive(Default, Clone)]
pub struct ScriptedExecutor {
    state: Arc<Mutex<ExecutorState>>,
    gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl ScriptedExecutor {
    pub fn fail_next_create(&self, message: &str) {
        self.state.lock().unwrap().create_failure = Some(message.to_string());
    }

    pub fn created_prompts(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    /// Queue answers for successive fetches of `id`.
    pub fn script(&self, id: &str, answers: Vec<Result<RunRecord, RunError>>) {
        self.state
            .lock()
            .unwrap()
            .fetches
            .entry(id.to_string())
            .or_default()
            .extend(answers);
    }

    pub fn fetch_count(&self, id: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .fetch_counts
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_listing(&self, listing: Result<Vec<RunRecord>, RunError>) {
        self.state.lock().unwrap().listing = Some(listing);
    }

    /// Make every fetch wait until the returned handle is notified.
    pub fn hold_fetches(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }
}

#[async_trait]
impl RunExecutor for ScriptedExecutor {
    async fn create_run(&self, prompt: &str) -> Result<RunRecord, RunError> {
        let mut st = self.state.lock().unwrap();
        if let Some(msg) = st.create_failure.take() {
            return Err(RunError::SubmissionFailed(msg));
        }
        st.next_id += 1;
        st.created.push(prompt.to_string());
        Ok(RunRecord::queued(format!("run-{}", st.next_id), prompt))
    }

    async fn fetch_run(&self, id: &str) -> Result<RunRecord, RunError> {
        let answer = {
            let mut st = self.state.lock().unwrap();
            *st.fetch_counts.entry(id.to_string()).or_default() += 1;
            st.fetches.get_mut(id).and_then(|q| q.pop_front())
        };
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        answer.unwrap_or_else(|| Err(RunError::TransientPollFault("no scripted answer".into())))
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, RunError> {
        match self.state.lock().unwrap().listing.clone() {
            Some(Ok(mut runs)) => {
                runs.truncate(limit);
                Ok(runs)
            }
            Some(Err(e)) => Err(e),
            None => Ok(Vec::new()),
        }
    }
}

/// Ticket store with optional per-id latency and transport failures.
#[derive(Default, Clone)]
pub struct StaticTickets {
    pub tickets: HashMap<String, serde_json::Value>,
    pub broken: HashSet<String>,
    pub delays: HashMap<String, Duration>,
}

impl StaticTickets {
    pub fn with(mut self, id: &str, ticket: serde_json::Value) -> Self {
        self.tickets.insert(id.to_string(), ticket);
        self
    }
}

#[async_trait]
impl TicketLookup for StaticTickets {
    async fn fetch_ticket(&self, id: &str) -> Result<serde_json::Value, LookupError> {
        if let Some(d) = self.delays.get(id) {
            tokio::time::sleep(*d).await;
        }
        if self.broken.contains(id) {
            return Err(LookupError::Transport {
                id: id.to_string(),
                message: "connection reset".into(),
            });
        }
        self.tickets
            .get(id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(id.to_string()))
    }
}
