//! Recent runs per demo surface, most recent first.
//!
//! Seeded once from the run-listing endpoint when a surface mounts, then kept current from
//! local submit and poll events only.

use crate::config::DemoConfig;
use crate::engine::RunExecutor;
use crate::model::RunRecord;
use std::collections::HashMap;

/// Bounded history for one demo surface.
#[derive(Debug, Clone)]
pub struct RunHistory {
    demo_id: String,
    limit: usize,
    runs: Vec<RunRecord>,
}

impl RunHistory {
    pub fn new(config: &DemoConfig) -> Self {
        Self {
            demo_id: config.id.clone(),
            limit: config.run_history_limit.max(1),
            runs: Vec::new(),
        }
    }

    /// Replace the contents with a fetched listing (already most recent first).
    pub fn seed(&mut self, runs: Vec<RunRecord>) {
        self.runs.clear();
        for r in runs {
            if self.runs.len() == self.limit {
                break;
            }
            if self.get(&r.id).is_none() {
                self.runs.push(r);
            }
        }
    }

    /// Add a new run at the front, evicting the oldest beyond the limit.
    pub fn push(&mut self, record: RunRecord) {
        self.runs.retain(|r| r.id != record.id);
        self.runs.insert(0, record);
        self.runs.truncate(self.limit);
    }

    /// Replace the entry with the same id in place. Returns false (and changes nothing) when the
    /// run is not in the history.
    pub fn update(&mut self, record: RunRecord) -> bool {
        match self.runs.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => {
                *slot = record;
                true
            }
            None => {
                tracing::debug!(demo = %self.demo_id, run_id = %record.id, "update for unknown run ignored");
                false
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&RunRecord> {
        self.runs.iter().find(|r| r.id == id)
    }

    pub fn list(&self) -> &[RunRecord] {
        &self.runs
    }
}

/// Fetch the initial history for a surface. A failed fetch leaves the history empty.
pub async fn load(executor: &dyn RunExecutor, config: &DemoConfig) -> RunHistory {
    let mut history = RunHistory::new(config);
    match executor.list_runs(config.run_history_limit).await {
        Ok(runs) => history.seed(runs),
        Err(e) => tracing::warn!(demo = %config.id, "could not load run history: {e}"),
    }
    history
}

/// Histories of every mounted surface in the process.
///
/// Each surface's `RunHistory` is handed to its controller while the surface is live and
/// returned when it shuts down, so no history is ever written from two places.
#[derive(Debug, Default)]
pub struct RunHistoryStore {
    surfaces: HashMap<String, RunHistory>,
}

impl RunHistoryStore {
    pub fn insert(&mut self, history: RunHistory) {
        self.surfaces.insert(history.demo_id.clone(), history);
    }

    pub fn take(&mut self, demo_id: &str) -> Option<RunHistory> {
        self.surfaces.remove(demo_id)
    }

    pub fn list(&self, demo_id: &str) -> &[RunRecord] {
        self.surfaces.get(demo_id).map(RunHistory::list).unwrap_or(&[])
    }
}
