//! Tracing setup: stdout plus a non-blocking log file

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info,chat_relay_server=debug";

/// Install the global subscriber. Keep the returned guard alive for the whole
/// process, otherwise buffered file output is lost on exit.
pub fn init(config: &LoggingConfig) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_appender = tracing_appender::rolling::never(&config.directory, &config.file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .with(fmt::layer().json().with_ansi(false).with_writer(file_writer))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true))
            .with(fmt::layer().with_ansi(false).with_writer(file_writer))
            .try_init()?;
    }

    Ok(guard)
}
