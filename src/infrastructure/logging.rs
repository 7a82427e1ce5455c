//! Logging system configuration and initialization
//!
//! Console logging through tracing-subscriber with an env-filter, plus an
//! optional non-blocking file layer. The file writer guard is kept alive
//! for the lifetime of the process.

use anyhow::Result;
use once_cell::sync::Lazy;
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub use crate::infrastructure::config::LoggingConfig;

// Keeps the non-blocking file writers alive
static LOG_GUARDS: Lazy<Mutex<Vec<WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Initialize the logging system with default configuration.
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize the logging system. `RUST_LOG` overrides the configured
/// filter when set.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.clone()));

    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    if config.file_output {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, "pricewatch.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        LOG_GUARDS
            .lock()
            .expect("log guard mutex poisoned")
            .push(guard);

        Registry::default()
            .with(filter)
            .with(console_layer)
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .try_init()?;
    } else {
        Registry::default()
            .with(filter)
            .with(console_layer)
            .try_init()?;
    }

    Ok(())
}
