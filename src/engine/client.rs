//! HTTP access to the run executor and the ticket dataset.

use crate::error::{LookupError, RunError};
use crate::model::RunRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

const RUNS_PATH: [&str; 2] = ["usecase-demo", "agent-runs"];
const TICKETS_PATH: [&str; 1] = ["csv-tickets"];

/// Creates, fetches and lists agent runs.
#[async_trait]
pub trait RunExecutor: Send + Sync {
    async fn create_run(&self, prompt: &str) -> Result<RunRecord, RunError>;
    async fn fetch_run(&self, id: &str) -> Result<RunRecord, RunError>;
    /// Most recent first.
    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, RunError>;
}

/// Reads single tickets by id.
#[async_trait]
pub trait TicketLookup: Send + Sync {
    async fn fetch_ticket(&self, id: &str) -> Result<serde_json::Value, LookupError>;
}

#[derive(Debug, Deserialize)]
struct RunList {
    #[serde(default)]
    runs: Vec<RunRecord>,
}

/// reqwest-backed client for the dashboard API (`<base>/api/...`).
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_base: Url,
}

impl ApiClient {
    /// `request_timeout` bounds each request; a timed-out poll is retried on the next tick.
    pub fn new(base_url: &str, request_timeout: Option<Duration>) -> Result<Self> {
        let mut api_base =
            Url::parse(base_url).with_context(|| format!("invalid base URL {base_url:?}"))?;
        if api_base.cannot_be_a_base() {
            anyhow::bail!("base URL {base_url:?} cannot carry a path");
        }
        if let Ok(mut segs) = api_base.path_segments_mut() {
            segs.pop_if_empty().push("api");
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(format!("usecase-demo-runs/{}", env!("CARGO_PKG_VERSION")));
        if let Some(t) = request_timeout {
            builder = builder.timeout(t);
        }
        let http = builder.build().context("build HTTP client")?;
        Ok(Self { http, api_base })
    }

    fn endpoint(&self, prefix: &[&str], tail: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut segs) = url.path_segments_mut() {
            segs.extend(prefix).extend(tail);
        }
        url
    }

    fn runs_url(&self, id: Option<&str>) -> Url {
        match id {
            Some(id) => self.endpoint(&RUNS_PATH, &[id]),
            None => self.endpoint(&RUNS_PATH, &[]),
        }
    }
}

/// Short description of a non-success response for error messages.
async fn describe_failure(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        let snippet: String = body.chars().take(200).collect();
        format!("HTTP {status}: {snippet}")
    }
}

#[async_trait]
impl RunExecutor for ApiClient {
    async fn create_run(&self, prompt: &str) -> Result<RunRecord, RunError> {
        let resp = self
            .http
            .post(self.runs_url(None))
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| RunError::SubmissionFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RunError::SubmissionFailed(describe_failure(resp).await));
        }
        resp.json::<RunRecord>()
            .await
            .map_err(|e| RunError::SubmissionFailed(format!("invalid run record: {e}")))
    }

    async fn fetch_run(&self, id: &str) -> Result<RunRecord, RunError> {
        let resp = self
            .http
            .get(self.runs_url(Some(id)))
            .send()
            .await
            .map_err(|e| RunError::TransientPollFault(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RunError::TransientPollFault(describe_failure(resp).await));
        }
        resp.json::<RunRecord>()
            .await
            .map_err(|e| RunError::TransientPollFault(format!("invalid run record: {e}")))
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, RunError> {
        let resp = self
            .http
            .get(self.runs_url(None))
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(|e| RunError::TransientPollFault(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RunError::TransientPollFault(describe_failure(resp).await));
        }
        let list = resp
            .json::<RunList>()
            .await
            .map_err(|e| RunError::TransientPollFault(format!("invalid run list: {e}")))?;
        Ok(list.runs)
    }
}

#[async_trait]
impl TicketLookup for ApiClient {
    async fn fetch_ticket(&self, id: &str) -> Result<serde_json::Value, LookupError> {
        let transport = |message: String| LookupError::Transport {
            id: id.to_string(),
            message,
        };
        let resp = self
            .http
            .get(self.endpoint(&TICKETS_PATH, &[id]))
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;
        match resp.status() {
            StatusCode::NOT_FOUND => return Err(LookupError::NotFound(id.to_string())),
            s if !s.is_success() => return Err(transport(describe_failure(resp).await)),
            _ => {}
        }
        let ticket = resp
            .json::<serde_json::Value>()
            .await
            .map_err(|e| transport(e.to_string()))?;
        if !ticket.is_object() {
            return Err(transport("ticket payload is not an object".into()));
        }
        Ok(ticket)
    }
}
