//! Replays a JSON-lines stream of anomaly signals through the reaper engine and
//! prints one outcome per line.
//!
//! ```text
//! signal-replay --config reaper.json --confirm-as oncall < signals.jsonl
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anomaly_reaper::ReaperEngine;
use anomaly_reaper::config::{EngineConfig, load_from_path};
use anomaly_reaper::kernel::{ActionAdapters, Confirmation, OutcomeReason, SessionRestrictions};
use anomaly_reaper::primitives::AnomalySignal;
use anomaly_reaper::telemetry::init_tracing;
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "signal-replay")]
#[command(about = "Replay anomaly signals through the reaper engine")]
struct Args {
    /// Engine configuration (JSON). Built-in tables are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON-lines signal file. Reads stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Approve parked destructive actions as this operator.
    #[arg(long)]
    confirm_as: Option<String>,

    /// Fallback log filter when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log)?;

    let config = match &args.config {
        Some(path) => load_from_path(path)?,
        None => EngineConfig::default(),
    };
    let restrictions = Arc::new(SessionRestrictions::new(config.throttle_delay()));
    let adapters = ActionAdapters::logging()
        .with_pauser(restrictions.pause_adapter())
        .with_throttler(restrictions.throttle_adapter());
    let engine = ReaperEngine::new(config, adapters)?;

    let replayed = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            replay(&engine, BufReader::new(file), args.confirm_as.as_deref()).await?
        }
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            replay(&engine, stdin, args.confirm_as.as_deref()).await?
        }
    };

    let pending = engine.pending_confirmations();
    for parked in &pending {
        info!(
            confirmation_id = %parked.id(),
            action = %parked.decision().action(),
            target = %parked.target(),
            expires_at = %parked.expires_at(),
            "left awaiting confirmation"
        );
    }
    info!(replayed, pending = pending.len(), "replay finished");
    engine.shutdown().await;
    Ok(())
}

async fn replay(
    engine: &ReaperEngine,
    reader: impl AsyncBufRead + Unpin,
    confirm_as: Option<&str>,
) -> Result<usize> {
    let mut lines = reader.lines();
    let mut replayed = 0;
    let mut line_no = 0;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let signal: AnomalySignal = match serde_json::from_str(&line) {
            Ok(signal) => signal,
            Err(err) => {
                warn!(line = line_no, error = %err, "skipping malformed signal");
                continue;
            }
        };
        let run_id = signal.run_id().clone();
        let mut outcome = match engine.handle(signal).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(line = line_no, error = %err, "signal rejected");
                continue;
            }
        };
        replayed += 1;

        if let (OutcomeReason::AwaitingConfirmation, Some(operator), Some(id)) =
            (outcome.reason(), confirm_as, outcome.confirmation_id())
        {
            outcome = engine.confirm(id, &Confirmation::new(operator)).await?;
        }
        println!(
            "{}",
            json!({ "line": line_no, "run_id": run_id, "outcome": outcome })
        );
    }
    Ok(replayed)
}
