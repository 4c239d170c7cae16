//! Global log subscriber installation.
//!
//! Library modules log through the `log` facade; this module routes those records into a
//! `tracing-subscriber` formatter so the binary gets filtered, timestamped console output.

use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use thiserror::Error;
use tracing_log::LogTracer;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Errors that can occur while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("failed to install log bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs the subscriber once; later calls are no-ops.
///
/// `RUST_LOG` takes precedence over `default_level` when it is set and parses.
pub fn init_logging(default_level: &str) -> Result<(), LoggingInitError> {
    if LOGGING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(false).compact());
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
