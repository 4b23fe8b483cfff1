mod cli;
mod config;
mod engine;
mod error;
mod history;
mod model;
mod orchestrator;
mod text_summary;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_logging(args: &cli::Cli) {
    let level = if args.silent {
        Level::ERROR
    } else {
        match args.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logging(&args);
    let is_silent = args.silent;
    let is_non_interactive = args.silent || args.json;

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit with code 0 on success so lingering tasks don't hold the process.
            if is_non_interactive {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            if is_silent {
                println!("{}", e);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
