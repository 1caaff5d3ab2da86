//! CLI entry point — the composition root.
//!
//! Parses arguments (with `HARK_*` environment overrides), initializes
//! logging, builds the engine, and hands everything to
//! [`hark_axum::start_server`]. Configuration problems are fatal here,
//! before the listener opens.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use hark_axum::{ServerConfig, start_server};
use hark_core::{LoopbackConfig, LoopbackEngine, SttEngine};

#[derive(Parser)]
#[command(
    name = "hark",
    version,
    about = "Streaming speech recognition over WebSockets"
)]
struct Cli {
    /// TCP listen port.
    #[arg(long, default_value_t = 6006, env = "HARK_PORT")]
    port: u16,

    /// Directory served over plain HTTP; must contain index.html.
    #[arg(long, default_value = "./web", env = "HARK_DOC_ROOT")]
    doc_root: PathBuf,

    /// Append-mode log file, tee'd with stdout.
    #[arg(long, env = "HARK_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Sample rate the engine expects, in Hz.
    #[arg(long, default_value_t = 16_000, env = "HARK_SAMPLE_RATE")]
    sample_rate: u32,

    /// Silence appended when a client finishes its stream, in milliseconds.
    #[arg(long, default_value_t = 300)]
    tail_padding_ms: u64,

    /// Ready-queue high-water mark for the decode dispatcher.
    #[arg(long, default_value_t = 1024)]
    queue_high_water: usize,
}

/// Install the tracing subscriber: stdout always, plus an append-mode file
/// layer when a log file is configured.
fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer());

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            subscriber
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .init();
        }
        None => subscriber.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads the env overrides.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let engine: Arc<dyn SttEngine> = Arc::new(LoopbackEngine::new(LoopbackConfig {
        sample_rate: cli.sample_rate,
        ..LoopbackConfig::default()
    }));
    tracing::info!(sample_rate = cli.sample_rate, "using loopback engine");

    let config = ServerConfig {
        port: cli.port,
        doc_root: cli.doc_root,
        tail_padding: Duration::from_millis(cli.tail_padding_ms),
        queue_high_water: cli.queue_high_water,
    };

    start_server(config, engine).await
}
