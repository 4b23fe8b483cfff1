//! Poll state machine for a single run.
//!
//! The poller does no I/O and owns no timer. A driver (the surface controller) asks it whether a
//! fetch should be issued, performs the fetch, and feeds the outcome back through `apply` together
//! with the generation the fetch was issued under. Outcomes from any other generation, or arriving
//! after `cancel`, are discarded.

use crate::config::DemoConfig;
use crate::error::RunError;
use crate::model::RunRecord;
use serde::Serialize;
use std::time::Duration;

/// Token identifying one poller lifetime on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Generation(u64);

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Hands out strictly increasing generations for one surface.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: u64,
}

impl GenerationCounter {
    pub fn advance(&mut self) -> Generation {
        self.current += 1;
        Generation(self.current)
    }

    pub fn current(&self) -> Generation {
        Generation(self.current)
    }

    pub fn is_current(&self, g: Generation) -> bool {
        g.0 == self.current
    }
}

/// What the driver should do after feeding a fetch outcome to the poller.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    /// Still non-terminal; fetch again after the interval.
    Pending { changed: bool },
    /// The fetch failed at the transport level; fetch again after the interval.
    Fault(String),
    /// Terminal status observed; the poller is done.
    Finished(RunRecord),
    /// The configured attempt bound was hit before a terminal status.
    Exhausted { attempts: u32 },
    /// Outcome belongs to another generation, a cancelled poller, or another run.
    Discarded,
}

#[derive(Debug)]
pub struct RunPoller {
    generation: Generation,
    record: RunRecord,
    interval: Duration,
    max_attempts: Option<u32>,
    attempts: u32,
    cancelled: bool,
    exhausted: bool,
}

impl RunPoller {
    pub fn new(record: RunRecord, generation: Generation, config: &DemoConfig) -> Self {
        Self {
            generation,
            record,
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts,
            attempts: 0,
            cancelled: false,
            exhausted: false,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The latest record view (last write wins).
    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True while further fetches may be scheduled.
    pub fn is_active(&self) -> bool {
        !self.cancelled && !self.exhausted && !self.record.is_terminal()
    }

    /// Stop the poller. Outcomes of fetches already in flight will be discarded.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Record that a fetch is being issued. Returns false when no fetch should happen.
    pub fn begin_fetch(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.attempts += 1;
        true
    }

    pub fn apply(
        &mut self,
        generation: Generation,
        outcome: Result<RunRecord, RunError>,
    ) -> PollStep {
        if generation != self.generation || !self.is_active() {
            tracing::debug!(
                run_id = %self.record.id,
                %generation,
                current = %self.generation,
                "discarding stale poll outcome"
            );
            return PollStep::Discarded;
        }

        let fetched = match outcome {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(run_id = %self.record.id, attempt = self.attempts, "poll failed: {e}");
                return self.exhaust_or(PollStep::Fault(e.to_string()));
            }
        };

        if fetched.id != self.record.id {
            tracing::warn!(
                run_id = %self.record.id,
                fetched = %fetched.id,
                "poll returned a different run; ignoring"
            );
            return self.exhaust_or(PollStep::Pending { changed: false });
        }

        if !self.record.status.can_transition_to(fetched.status) {
            tracing::warn!(
                run_id = %self.record.id,
                from = %self.record.status,
                to = %fetched.status,
                "executor reported a backwards status"
            );
        }

        let changed = fetched != self.record;
        self.record = fetched;

        if self.record.is_terminal() {
            if let Some(problem) = self.record.payload_violation() {
                tracing::warn!(run_id = %self.record.id, "{problem}");
            }
            tracing::info!(
                run_id = %self.record.id,
                status = %self.record.status,
                attempts = self.attempts,
                "run reached terminal status"
            );
            return PollStep::Finished(self.record.clone());
        }
        self.exhaust_or(PollStep::Pending { changed })
    }

    fn exhaust_or(&mut self, step: PollStep) -> PollStep {
        match self.max_attempts {
            Some(max) if self.attempts >= max => {
                self.exhausted = true;
                PollStep::Exhausted {
                    attempts: self.attempts,
                }
            }
            _ => step,
        }
    }
}
