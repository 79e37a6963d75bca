//! Logging initialization using the `tracing` ecosystem.
//!
//! Console output is always on. With a log directory, a daily-rotated file
//! (`{dir}/{prefix}.YYYY-MM-DD`) is written through a non-blocking worker,
//! as plain text or one JSON object per line. `RUST_LOG` overrides the
//! configured level.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging knobs resolved from the CLI and the `app` config block.
#[derive(Debug, Clone, Copy)]
pub struct LogSettings<'a> {
    /// Default filter when `RUST_LOG` is unset (e.g. `"info"`).
    pub level: &'a str,
    /// Directory for rotated log files; console only when `None`.
    pub dir: Option<&'a str>,
    /// Log file prefix, normally the module name.
    pub file_prefix: &'a str,
    /// Write the file as JSON lines.
    pub json: bool,
}

/// Install the global subscriber. Call once at startup.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
pub fn init_logging(settings: &LogSettings<'_>) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.level));

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    let (file_layer, guard) = match settings.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, settings.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true);
            let layer = if settings.json {
                layer.json().boxed()
            } else {
                layer.boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();
    guard
}
