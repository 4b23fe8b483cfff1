//! Run lifecycle controller for one demo surface.
//!
//! Owns the surface's poller, history and generation counter, schedules poll fetches, and emits
//! events for presentation layers. Every network call runs as its own task and reports back
//! tagged with the generation that issued it; anything from an older generation is dropped.

use crate::config::DemoConfig;
use crate::engine::{submit, Generation, GenerationCounter, PollStep, RunExecutor, RunPoller, TicketLookup};
use crate::error::RunError;
use crate::history::{self, RunHistory};
use crate::model::{InfoEvent, ProcessedRun, RunEvent, RunRecord};
use crate::orchestrator::post_process::process_run_completion;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

/// Commands emitted by UI layers to drive a surface.
#[derive(Debug, Clone)]
pub(crate) enum SurfaceCommand {
    Submit(String),
    Cancel,
    Quit,
}

/// Collaborators of one demo surface.
#[derive(Clone)]
pub(crate) struct Surface {
    pub config: DemoConfig,
    pub executor: Arc<dyn RunExecutor>,
    pub tickets: Arc<dyn TicketLookup>,
}

/// Results of spawned work, tagged with the generation that started it.
enum Completion {
    Submitted(Generation, Result<RunRecord, RunError>),
    Polled(Generation, Result<RunRecord, RunError>),
    Processed(Generation, Box<ProcessedRun>),
}

struct SurfaceState {
    surface: Surface,
    history: RunHistory,
    generations: GenerationCounter,
    poller: Option<RunPoller>,
    next_poll: Option<Instant>,
    event_tx: UnboundedSender<RunEvent>,
    done_tx: UnboundedSender<Completion>,
}

impl SurfaceState {
    fn emit(&self, ev: RunEvent) {
        let _ = self.event_tx.send(ev);
    }

    /// Invalidate all in-flight work and stop the current poller, if any.
    fn cancel_current(&mut self) {
        self.generations.advance();
        self.next_poll = None;
        if let Some(mut p) = self.poller.take() {
            if p.is_active() {
                p.cancel();
                tracing::info!(demo = %self.surface.config.id, run_id = %p.record().id, "poller cancelled");
                self.emit(RunEvent::Info(InfoEvent::Cancelled {
                    run_id: p.record().id.clone(),
                }));
            }
        }
    }

    /// Explicit cancel. A run that already reached a terminal status keeps its post-processing.
    fn cancel(&mut self) {
        if self.poller.as_ref().is_some_and(|p| !p.is_active()) {
            tracing::debug!(demo = %self.surface.config.id, "cancel ignored, run already finished");
            return;
        }
        self.cancel_current();
    }

    fn submit(&mut self, prompt: String) {
        // Refuse before touching the in-flight run.
        if prompt.trim().is_empty() {
            self.emit(RunEvent::SubmissionFailed {
                message: RunError::EmptyPrompt.to_string(),
            });
            return;
        }
        self.cancel_current();
        let generation = self.generations.current();
        let surface = self.surface.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let res = submit::submit(surface.executor.as_ref(), &prompt, &surface.config).await;
            let _ = done_tx.send(Completion::Submitted(generation, res));
        });
    }

    fn start_polling(&mut self, record: RunRecord) {
        let poller = RunPoller::new(record.clone(), self.generations.current(), &self.surface.config);
        if poller.is_active() {
            self.next_poll = Some(Instant::now() + poller.interval());
            self.poller = Some(poller);
        } else {
            // The executor already finished the run at creation time.
            let generation = poller.generation();
            self.poller = Some(poller);
            self.finish(generation, record);
        }
    }

    fn fetch(&mut self) {
        self.next_poll = None;
        let Some(poller) = self.poller.as_mut() else {
            return;
        };
        if !poller.begin_fetch() {
            return;
        }
        tracing::debug!(run_id = %poller.record().id, attempt = poller.attempts(), "polling run");
        let generation = poller.generation();
        let id = poller.record().id.clone();
        let executor = self.surface.executor.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let res = executor.fetch_run(&id).await;
            let _ = done_tx.send(Completion::Polled(generation, res));
        });
    }

    fn finish(&mut self, generation: Generation, record: RunRecord) {
        self.history.update(record.clone());
        self.emit(RunEvent::StatusChanged {
            record: record.clone(),
        });
        let surface = self.surface.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let processed =
                process_run_completion(&surface.config, surface.tickets.as_ref(), record).await;
            let _ = done_tx.send(Completion::Processed(generation, Box::new(processed)));
        });
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Submitted(g, res) => {
                if !self.generations.is_current(g) {
                    if let Ok(r) = res {
                        tracing::debug!(run_id = %r.id, "dropping superseded submission");
                    }
                    return;
                }
                match res {
                    Ok(record) => {
                        self.history.push(record.clone());
                        self.emit(RunEvent::Submitted {
                            record: record.clone(),
                        });
                        self.start_polling(record);
                    }
                    Err(e) => self.emit(RunEvent::SubmissionFailed {
                        message: e.to_string(),
                    }),
                }
            }
            Completion::Polled(g, res) => {
                if !self.generations.is_current(g) {
                    tracing::debug!(generation = %g, "dropping late poll response");
                    return;
                }
                let Some(poller) = self.poller.as_mut() else {
                    return;
                };
                let run_id = poller.record().id.clone();
                let interval = poller.interval();
                match poller.apply(g, res) {
                    PollStep::Pending { changed } => {
                        if changed {
                            let record = poller.record().clone();
                            self.emit(RunEvent::StatusChanged { record });
                        }
                        self.next_poll = Some(Instant::now() + interval);
                    }
                    PollStep::Fault(message) => {
                        self.emit(RunEvent::Info(InfoEvent::PollFault { run_id, message }));
                        self.next_poll = Some(Instant::now() + interval);
                    }
                    PollStep::Finished(record) => self.finish(g, record),
                    PollStep::Exhausted { attempts } => {
                        tracing::warn!(run_id = %run_id, attempts, "poll attempt bound reached");
                        self.emit(RunEvent::Info(InfoEvent::PollAttemptsExhausted {
                            run_id,
                            attempts,
                        }));
                    }
                    PollStep::Discarded => {}
                }
            }
            Completion::Processed(g, processed) => {
                if self.generations.is_current(g) {
                    self.emit(RunEvent::RunFinished { processed });
                }
            }
        }
    }
}

/// Drive one demo surface until `Quit` (or the command channel closes).
///
/// `history` is the surface's cached history when re-mounting; `None` loads it from the
/// run-listing endpoint. The history is handed back when the surface shuts down.
pub(crate) async fn run_controller(
    surface: Surface,
    history: Option<RunHistory>,
    event_tx: UnboundedSender<RunEvent>,
    mut cmd_rx: UnboundedReceiver<SurfaceCommand>,
) -> Result<RunHistory> {
    let history = match history {
        Some(h) => h,
        None => history::load(surface.executor.as_ref(), &surface.config).await,
    };
    let _ = event_tx.send(RunEvent::HistoryLoaded {
        runs: history.list().to_vec(),
    });

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
    let mut state = SurfaceState {
        surface,
        history,
        generations: GenerationCounter::default(),
        poller: None,
        next_poll: None,
        event_tx,
        done_tx,
    };

    loop {
        let next_poll = state.next_poll;
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SurfaceCommand::Submit(prompt)) => state.submit(prompt),
                    Some(SurfaceCommand::Cancel) => state.cancel(),
                    Some(SurfaceCommand::Quit) | None => {
                        state.cancel_current();
                        break;
                    }
                }
            }
            Some(done) = done_rx.recv() => state.on_completion(done),
            _ = async {
                match next_poll {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => futures::future::pending().await,
                }
            } => state.fetch(),
        }
    }

    Ok(state.history)
}
