//! Network-facing workers: the API client, run submission, polling, result extraction and
//! ticket correlation.

pub mod client;
pub mod correlate;
pub mod extract;
pub mod poller;
pub mod submit;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, RunExecutor, TicketLookup};
pub use poller::{Generation, GenerationCounter, PollStep, RunPoller};
