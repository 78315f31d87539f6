//! Logging setup
//!
//! `RELAY_LOG_FORMAT=json` switches stdout to JSON lines (pretty otherwise).
//! `RELAY_LOG_DIR` additionally writes JSON logs to a daily rolling file.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FORMAT_ENV: &str = "RELAY_LOG_FORMAT";
const LOG_DIR_ENV: &str = "RELAY_LOG_DIR";
const DEFAULT_FILTER: &str = "relay=info";
const LOG_FILE_PREFIX: &str = "relay-jobs.log";

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process, dropping it flushes the file writer.
pub fn init() -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) => {
            let dir = shellexpand::tilde(&dir).into_owned();
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().json().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    match std::env::var(LOG_FORMAT_ENV).as_deref() {
        // Production: JSON structured logging
        Ok("json") => registry.with(fmt::layer().json()).try_init(),
        // Development: Pretty formatting with colors
        _ => registry.with(fmt::layer().pretty()).try_init(),
    }
    .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
