//! Error taxonomy for run submission, polling, ticket lookup and configuration.
//!
//! Partial correlation and empty results are not errors; see `Correlation::is_partial`
//! and `ExtractedResult::is_empty`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    /// Rejected before any request is made.
    #[error("prompt must not be empty")]
    EmptyPrompt,
    /// The create request failed; no run exists.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
    /// A poll fetch failed at the transport level; the next tick retries.
    #[error("transient poll fault: {0}")]
    TransientPollFault(String),
    /// The executor reported `status = error` for the run.
    #[error("run {id} failed: {message}")]
    RunFailed { id: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("ticket {0} not found")]
    NotFound(String),
    #[error("ticket {id} lookup failed: {message}")]
    Transport { id: String, message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("demo {demo:?}: {reason}")]
    Invalid { demo: String, reason: String },
    #[error("duplicate demo id {0:?}")]
    DuplicateDemo(String),
    #[error("unknown demo {0:?}")]
    UnknownDemo(String),
    #[error("failed to read demo definitions from {path}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse demo definitions from {path}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
