use crate::config::{DemoConfig, DemoRegistry};
use crate::engine::{ApiClient, RunExecutor};
use crate::error::{ConfigError, RunError};
use crate::history::{RunHistory, RunHistoryStore};
use crate::model::{InfoEvent, ProcessedRun, RunEvent};
use crate::orchestrator::{run_controller, Surface, SurfaceCommand};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "usecase-runs",
    version,
    about = "Submit background agent runs for a demo surface, poll them and correlate tickets"
)]
pub struct Cli {
    /// Base URL of the dashboard backend
    #[arg(long, default_value = "http://localhost:3000")]
    pub base_url: String,

    /// Demo surface to drive
    #[arg(long, default_value = "usecase-demo")]
    pub demo: String,

    /// Prompt to submit (defaults to the demo's default prompt)
    #[arg(long)]
    pub prompt: Option<String>,

    /// JSON file with demo definitions (defaults to the user config dir, then built-ins)
    #[arg(long)]
    pub demos_file: Option<std::path::PathBuf>,

    /// Override the demo's poll interval
    #[arg(long)]
    pub poll_interval: Option<humantime::Duration>,

    /// Per-request timeout; a timed-out poll is retried on the next interval
    #[arg(long)]
    pub request_timeout: Option<humantime::Duration>,

    /// Give up after this many polls (default: poll until the run finishes)
    #[arg(long)]
    pub max_poll_attempts: Option<u32>,

    /// Print the demo's recent runs and exit
    #[arg(long)]
    pub history: bool,

    /// Print the configured demos and exit
    #[arg(long)]
    pub list_demos: bool,

    /// Print JSON result and exit
    #[arg(long)]
    pub json: bool,

    /// Print text summary (default)
    #[arg(long)]
    pub text: bool,

    /// Run silently: suppress all output except errors (for cron usage)
    #[arg(long)]
    pub silent: bool,

    /// Export the processed run as JSON
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub async fn run(args: Cli) -> Result<()> {
    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }
    if args.json && args.text {
        return Err(anyhow::anyhow!("--json and --text are mutually exclusive"));
    }

    let registry = DemoRegistry::load(args.demos_file.as_deref())?;
    if args.list_demos {
        return list_demos(&registry).await;
    }
    let config = build_config(&args, &registry)?;
    let client = Arc::new(
        ApiClient::new(
            &args.base_url,
            args.request_timeout.map(Duration::from),
        )?,
    );

    if args.history {
        return print_history(client.as_ref(), &config).await;
    }

    run_demo(args, config, client).await
}

/// Resolve the selected demo and apply CLI overrides.
pub fn build_config(args: &Cli, registry: &DemoRegistry) -> Result<DemoConfig> {
    let mut cfg = registry.get(&args.demo)?.clone();
    if let Some(interval) = args.poll_interval {
        cfg.poll_interval_ms = u64::try_from(Duration::from(interval).as_millis())
            .map_err(|_| ConfigError::Invalid {
                demo: cfg.id.clone(),
                reason: format!("poll interval {interval} is too large"),
            })?;
    }
    if args.max_poll_attempts.is_some() {
        cfg.max_poll_attempts = args.max_poll_attempts;
    }
    cfg.validate()?;
    Ok(cfg)
}

async fn list_demos(registry: &DemoRegistry) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    for d in registry.iter() {
        let views: Vec<&str> = d.result_views.iter().map(|v| v.as_str()).collect();
        let _ = out_tx.send(OutputLine::Stdout(format!(
            "{:<16} {:<24} views: {}",
            d.id,
            d.title,
            views.join(", ")
        )));
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Explicit history query: unlike surface mount, a failed listing is an error.
async fn print_history(executor: &dyn RunExecutor, config: &DemoConfig) -> Result<()> {
    let runs = executor
        .list_runs(config.run_history_limit)
        .await
        .context("list recent runs")?;
    let mut history = RunHistory::new(config);
    history.seed(runs);

    let (out_tx, out_handle) = spawn_output_writer();
    for line in crate::text_summary::history_lines(history.list()) {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

async fn run_demo(args: Cli, config: DemoConfig, client: Arc<ApiClient>) -> Result<()> {
    let prompt = args
        .prompt
        .clone()
        .unwrap_or_else(|| config.default_prompt.clone());
    let out_tx = (!args.silent).then(spawn_output_writer);
    let say = |line: String| {
        if let Some((tx, _)) = out_tx.as_ref() {
            let _ = tx.send(OutputLine::Stderr(line));
        }
    };

    let mut store = RunHistoryStore::default();
    let surface = Surface {
        config: config.clone(),
        executor: client.clone(),
        tickets: client,
    };
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<RunEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<SurfaceCommand>();
    let controller = tokio::spawn(run_controller(
        surface,
        store.take(&config.id),
        evt_tx,
        cmd_rx,
    ));
    let _ = cmd_tx.send(SurfaceCommand::Submit(prompt));

    let outcome: Result<ProcessedRun> = loop {
        tokio::select! {
            ev = evt_rx.recv() => {
                let Some(ev) = ev else {
                    break Err(anyhow::anyhow!("controller stopped unexpectedly"));
                };
                match ev {
                    RunEvent::HistoryLoaded { runs } => {
                        say(format!("{} recent runs for {}", runs.len(), config.id));
                    }
                    RunEvent::Submitted { record } => {
                        say(format!("Submitted run {} ({})", record.id, record.status));
                    }
                    RunEvent::SubmissionFailed { message } => {
                        break Err(anyhow::anyhow!(message));
                    }
                    RunEvent::StatusChanged { record } => {
                        let tools = if record.tools_used.is_empty() {
                            String::new()
                        } else {
                            format!(" [{}]", record.tools_used.join(", "))
                        };
                        say(format!("{}: {}{}", record.id, record.status, tools));
                    }
                    RunEvent::RunFinished { processed } => break Ok(*processed),
                    RunEvent::Info(info @ InfoEvent::PollAttemptsExhausted { .. }) => {
                        break Err(anyhow::anyhow!(info.to_message()));
                    }
                    RunEvent::Info(info) => say(info.to_message()),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = cmd_tx.send(SurfaceCommand::Cancel);
                break Err(anyhow::anyhow!("interrupted"));
            }
        }
    };

    let _ = cmd_tx.send(SurfaceCommand::Quit);
    let history = controller
        .await
        .context("run controller task failed")?
        .context("run controller failed")?;
    store.insert(history);

    let processed = match outcome {
        Ok(p) => p,
        Err(e) => {
            if let Some((tx, handle)) = out_tx {
                drop(tx);
                let _ = handle.await;
            }
            return Err(e);
        }
    };

    if let Some(p) = args.export_json.as_deref() {
        let body = serde_json::to_string_pretty(&processed)?;
        std::fs::write(p, body).with_context(|| format!("write {}", p.display()))?;
        say(format!("Exported JSON: {}", p.display()));
    }

    if let Some((tx, _)) = out_tx.as_ref() {
        if args.json {
            let _ = tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&processed)?));
        } else {
            let summary = crate::text_summary::build_text_summary(&processed, &config);
            for line in summary.lines {
                let _ = tx.send(OutputLine::Stdout(line));
            }
            let _ = tx.send(OutputLine::Stdout(String::new()));
            let _ = tx.send(OutputLine::Stdout("Recent runs:".into()));
            for line in crate::text_summary::history_lines(store.list(&config.id)) {
                let _ = tx.send(OutputLine::Stdout(line));
            }
        }
    }

    if let Some((tx, handle)) = out_tx {
        drop(tx);
        let _ = handle.await;
    }

    match processed.result.error {
        Some(message) => Err(RunError::RunFailed {
            id: processed.record.id,
            message,
        }
        .into()),
        None => Ok(()),
    }
}
