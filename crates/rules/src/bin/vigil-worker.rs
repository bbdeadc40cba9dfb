//! vigil-worker: runs one tenant's rule engine over a stream of readings.
//!
//! Reads newline-delimited JSON ingest records from stdin:
//!
//! ```text
//! {"source_id": "42", "reading": {"temp": 30}, "arrival_ms": 1700000000000}
//! ```
//!
//! `arrival_ms` is optional; records without it are stamped on receipt.
//! Fired rules are logged, and also POSTed to `--webhook-url` when set.
//! Stops on end of input or Ctrl-C, draining queued actions first.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use vigil_actions::{ActionHandler, ActionRouter, LogActionHandler, WebhookActionHandler};
use vigil_core::config::load_dotenv;
use vigil_core::{Clock, EngineConfig, IngestRecord, SystemClock};
use vigil_rules::{CompiledRuleSet, Engine, LoggingObserver};

// ── CLI ─────────────────────────────────────────────────────────────

/// Streaming rule engine worker for a single tenant.
#[derive(Parser, Debug)]
#[command(name = "vigil-worker", version, about)]
struct Cli {
    /// Path to the YAML rule set.
    #[arg(long, env = "VIGIL_RULES_FILE", default_value = "config/rules.yaml")]
    rules: PathBuf,

    /// Tenant this worker evaluates rules for.
    #[arg(long, env = "VIGIL_TENANT", default_value = "default")]
    tenant: String,

    /// Webhook that receives every fired rule as JSON.
    #[arg(long, env = "VIGIL_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Override idle re-evaluation (otherwise taken from VIGIL_IDLE_REEVALUATION).
    #[arg(long)]
    idle_reevaluation: Option<bool>,
}

fn build_router(webhook_url: Option<String>) -> anyhow::Result<ActionRouter> {
    let log: Arc<dyn ActionHandler> = Arc::new(LogActionHandler);
    let mut handlers = vec![log];
    if let Some(url) = webhook_url {
        let webhook = WebhookActionHandler::from_config(url, None, None)
            .context("invalid webhook configuration")?;
        handlers.push(Arc::new(webhook));
    }
    Ok(ActionRouter::with_defaults(handlers))
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env();
    if let Some(enabled) = cli.idle_reevaluation {
        config = config.with_idle_reevaluation(enabled);
    }
    config.log_summary();

    let rules = CompiledRuleSet::from_file(&cli.rules)
        .with_context(|| format!("failed to load rules from {}", cli.rules.display()))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let engine = Arc::new(
        Engine::builder(cli.tenant.clone(), Arc::new(rules))
            .config(config)
            .clock(Arc::clone(&clock))
            .router(build_router(cli.webhook_url)?)
            .build(),
    );
    engine.start()?;
    engine.register_observer(Arc::new(LoggingObserver));

    info!(tenant = %cli.tenant, "vigil-worker reading from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut accepted: u64 = 0;
    let mut rejected: u64 = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("end of input");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read stdin");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let record = match IngestRecord::parse_line(&line) {
                    Ok(record) => record,
                    Err(e) => {
                        rejected += 1;
                        warn!(error = %e, "skipping malformed ingest record");
                        continue;
                    }
                };
                let arrival = record.arrival_ms.unwrap_or_else(|| clock.now_millis());
                // The evaluator runs under the engine lock and may be slow.
                let cycle = Arc::clone(&engine);
                tokio::task::spawn_blocking(move || {
                    cycle.evaluate(record.source_id, record.reading, arrival)
                })
                .await
                .context("evaluation task failed")??;
                accepted += 1;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }

    engine.stop().await;
    info!(accepted, rejected, "vigil-worker exited cleanly");
    Ok(())
}
