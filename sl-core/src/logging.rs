//! Tracing setup for the CLI.
//!
//! Events go to stderr for the operator and to a daily-rotated file under the
//! configured log directory, either as plain text or as JSON lines.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::SlResult;

const DEFAULT_DIRECTIVE: &str = "info";
const LOG_FILE_PREFIX: &str = "scanlink.log";

/// `--verbose` turns on our debug output without the per-frame websocket chatter.
const VERBOSE_DIRECTIVE: &str = "debug,tungstenite=info,tokio_tungstenite=info";

/// Keeps the background file writer alive. Dropping it flushes the log file.
#[must_use = "file logging stops when the guard is dropped"]
pub struct LogGuard {
    _file: WorkerGuard,
}

/// Install the global subscriber described by the `[logging]` section.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> SlResult<LogGuard> {
    let dir = config.effective_directory()?;
    std::fs::create_dir_all(&dir)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX));

    let directive = filter_directive(config, verbose);
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();
    let json_file = config.json_output.then(|| {
        fmt::layer()
            .json()
            .with_writer(file_writer.clone())
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });
    let text_file = (!config.json_output).then(|| {
        fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(EnvFilter::new(&directive))
        .with(console)
        .with(json_file)
        .with(text_file)
        .try_init()
        .map_err(anyhow::Error::from)?;

    tracing::debug!(filter = %directive, dir = %dir.display(), "logging initialized");
    Ok(LogGuard { _file: guard })
}

/// The filter directive to install. A configured level that does not parse
/// falls back to `info` rather than silencing everything.
fn filter_directive(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        return VERBOSE_DIRECTIVE.to_string();
    }
    let level = config.level.trim();
    if level.is_empty() || EnvFilter::try_new(level).is_err() {
        return DEFAULT_DIRECTIVE.to_string();
    }
    level.to_string()
}
