//! # bw-runner
//!
//! Entry point for the barwatch pipeline.
//!
//! Loads a JSON configuration file, polls the configured bar pairs, runs the
//! configured detectors on every new bar and logs the resulting signals.
//!
//! # Usage
//!
//! ```bash
//! bw-runner config.json --log-level info
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bw_core::EventBus;
use bw_core::logging::{LogSettings, init_logging};
use bw_md::DataSource;
use bw_md::binance::BinanceKlineClient;
use bw_md::scheduler::{Scheduler, SchedulerConfig};
use bw_signal::{SignalAdaptor, SignalLogSink, build_detectors};
use clap::Parser;
use tracing::info;

/// Bar polling and trend signal runner.
#[derive(Parser)]
#[command(name = "bw-runner", about = "Bar polling and trend signal runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output. Overrides `app.log_path`.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = bw_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let module_name = config.module_name();
    let _log_guard = init_logging(&LogSettings {
        level: &cli.log_level,
        dir: cli.log_dir.as_deref().or(config.app.log_path.as_deref()),
        file_prefix: &module_name,
        json: config.app.log_json,
    });

    info!(
        "bw-runner starting, config={}, log_level={}, {} detector(s)",
        cli.config.display(),
        cli.log_level,
        config.detectors.len(),
    );

    // 3. Bus and data source
    let bus = Arc::new(EventBus::with_dedupe_window(config.feed.dedupe_window));
    let source: Arc<dyn DataSource> = Arc::new(BinanceKlineClient::new(
        config.feed.rest_url.clone(),
        Duration::from_secs(config.feed.request_timeout_secs),
    )?);
    info!("data source '{}' at {}", source.name(), config.feed.rest_url);

    // 4. Detectors, adaptor and sink
    let detectors = build_detectors(&config.detectors).context("building detectors")?;
    let mut adaptor = SignalAdaptor::bind(Arc::clone(&bus), detectors).await;
    let mut sink = SignalLogSink::bind(Arc::clone(&bus));

    // 5. Start polling every configured pair plus every pair a detector needs
    let mut scheduler = Scheduler::new(source, Arc::clone(&bus), SchedulerConfig::from(&config.feed));
    let started = scheduler
        .start_many(config.all_pairs())
        .context("starting scheduler")?;
    info!(
        "{started} pair(s) polling, {} bar topic(s) bound, press Ctrl+C to stop",
        adaptor.topics().len()
    );

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 7. Stop polling, then detach consumers
    scheduler.stop().await;
    adaptor.unbind();
    sink.unbind();

    info!("stopped after {} signal(s)", sink.delivered());
    Ok(())
}
