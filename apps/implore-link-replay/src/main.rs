//! implore-link-replay - Headless linked-view replay
//!
//! Replays a JSON script of host commands and user gestures against a
//! linked-view session backed by headless renderers. Host events are
//! written to stdout as JSON lines; logs go to stderr.

mod error;
mod host;
mod script;

use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use error::ReplayError;
use host::ReplayHost;
use script::Script;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay linked scatterplot interactions headlessly")]
struct Args {
    /// Script to replay
    script: PathBuf,

    /// Session configuration (.toml or .json), overrides the script's own
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "implore_link=trace" (default: RUST_LOG, then info)
    #[arg(long)]
    log_level: Option<String>,

    /// Print a JSON summary after the last event
    #[arg(long)]
    summary: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let script = Script::load(&args.script)?;
    let config = match &args.config {
        Some(path) => script::load_config(path)?,
        None => script.config.clone().unwrap_or_default(),
    };
    tracing::info!(
        steps = script.steps.len(),
        leader_window_ms = config.sync.leader_window_ms,
        warmup_ms = config.sync.warmup_ms,
        "Starting replay of {}",
        args.script.display()
    );

    let mut host = ReplayHost::new(config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = host.run(&script, &mut out)?;

    if args.summary {
        let line = serde_json::to_string(&summary)?;
        writeln!(out, "{}", line).map_err(ReplayError::Output)?;
    }
    if summary.failed_steps > 0 {
        tracing::warn!(failed = summary.failed_steps, "Replay finished with failed steps");
    }

    Ok(())
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
