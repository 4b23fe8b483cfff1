use crate::config::DemoConfig;
use crate::engine::client::RunExecutor;
use crate::error::RunError;
use crate::model::{RunRecord, RunStatus};

/// Create a new run for `prompt` on the given demo surface.
///
/// Blank prompts are refused before any request is made. A failed create request yields
/// `SubmissionFailed` and leaves no trace; the caller may simply resubmit.
pub async fn submit(
    executor: &dyn RunExecutor,
    prompt: &str,
    config: &DemoConfig,
) -> Result<RunRecord, RunError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(RunError::EmptyPrompt);
    }

    let record = executor.create_run(prompt).await?;
    if record.id.trim().is_empty() {
        return Err(RunError::SubmissionFailed(
            "executor returned a run without an id".into(),
        ));
    }
    if record.status != RunStatus::Queued {
        tracing::debug!(
            demo = %config.id,
            run_id = %record.id,
            status = %record.status,
            "new run is already past queued"
        );
    }
    tracing::info!(demo = %config.id, run_id = %record.id, "run submitted");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemoRegistry;
    use crate::engine::testing::ScriptedExecutor;

    #[tokio::test]
    async fn blank_prompt_is_refused_without_request() {
        let exec = ScriptedExecutor::default();
        let cfg = DemoRegistry::builtin().get("usecase-demo").unwrap().clone();

        let err = submit(&exec, "   \n", &cfg).await.unwrap_err();
        assert_eq!(err, RunError::EmptyPrompt);
        assert!(exec.created_prompts().is_empty());
    }

    #[tokio::test]
    async fn submits_trimmed_prompt() {
        let exec = ScriptedExecutor::default();
        let cfg = DemoRegistry::builtin().get("usecase-demo").unwrap().clone();

        let record = submit(&exec, "  mock prompt ", &cfg).await.unwrap();
        assert_eq!(record.id, "run-1");
        assert_eq!(record.status, RunStatus::Queued);
        assert_eq!(exec.created_prompts(), vec!["mock prompt".to_string()]);
    }

    #[tokio::test]
    async fn create_failure_propagates() {
        let exec = ScriptedExecutor::default();
        exec.fail_next_create("connection refused");
        let cfg = DemoRegistry::builtin().get("usecase-demo").unwrap().clone();

        let err = submit(&exec, "p", &cfg).await.unwrap_err();
        assert_eq!(err, RunError::SubmissionFailed("connection refused".into()));
    }
}
