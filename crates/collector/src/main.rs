//! Flowgate - flow-record collector distribution pipeline
//!
//! Runs the distribution core against synthetic traffic: a generator
//! stands in for the protocol decoder and every simulated observation
//! domain gets its own data manager fanning out to the selected sink.
//!
//! # Usage
//!
//! ```bash
//! # defaults: 4 ODIDs x 10000 messages into the null sink
//! flowgate
//!
//! # custom run with config file and per-message summaries
//! flowgate --config flowgate.toml --odids 8 --messages 1000 --print
//! ```

mod generator;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use flowgate_config::Config;
use flowgate_pipeline::{Distributor, StoragePlugin};
use flowgate_sinks::{NullSink, StdoutSink};

use crate::generator::GeneratorConfig;

/// Flowgate - flow-record collector distribution pipeline
#[derive(Parser, Debug)]
#[command(name = "flowgate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config
    #[arg(short, long)]
    log_level: Option<String>,

    /// Number of simulated observation domains
    #[arg(long, default_value_t = 4)]
    odids: u32,

    /// Data messages per observation domain
    #[arg(long, default_value_t = 10_000)]
    messages: u64,

    /// Records per data message
    #[arg(long, default_value_t = 10)]
    records: u32,

    /// Payload bytes per data message
    #[arg(long, default_value_t = 512)]
    payload_bytes: usize,

    /// Print a summary line per stored message instead of discarding
    #[arg(long)]
    print: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => {
            Config::from_file(path).context("failed to load configuration")?
        }
        None => {
            let default_path = PathBuf::from("flowgate.toml");
            if default_path.exists() {
                Config::from_file(&default_path).context("failed to load configuration")?
            } else {
                Config::default()
            }
        }
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log.level.as_str().to_string());
    init_logging(&level)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        queue_capacity = config.collector.queue_capacity,
        "Flowgate starting"
    );

    run(cli, config).await
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let mut distributor = Distributor::new(&config);

    // Attach the selected sink to every observation domain
    let null_sink = Arc::new(NullSink::new());
    if cli.print {
        distributor.attach_plugin(Arc::new(StdoutSink::new()), None);
    } else {
        let plugin: Arc<dyn StoragePlugin> = null_sink.clone();
        distributor.attach_plugin(plugin, None);
    }

    distributor.start()?;

    let traffic = GeneratorConfig {
        odids: cli.odids,
        messages_per_odid: cli.messages,
        records_per_message: cli.records,
        payload_bytes: cli.payload_bytes,
    };

    let started = Instant::now();
    let written = generator::run(distributor.input_queue(), traffic)
        .await
        .context("input queue closed during generation")?;

    // Shutdown drains the pipeline before returning
    distributor.close().await;
    let elapsed = started.elapsed();

    if !cli.print {
        let stored = null_sink.snapshot();
        info!(
            messages = stored.messages,
            records = stored.records,
            bytes = stored.bytes,
            "sink totals"
        );
    }

    info!(
        messages = written,
        elapsed_ms = elapsed.as_millis() as u64,
        rate_per_sec = (written as f64 / elapsed.as_secs_f64()) as u64,
        "run complete"
    );

    Ok(())
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
