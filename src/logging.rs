use crate::config::AppConfig;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Unknown log rotation {0:?} (expected hourly, daily or never)")]
    UnknownRotation(String),

    #[error("Failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

fn rotation(name: &str) -> Result<Rotation, LoggingError> {
    match name {
        "hourly" => Ok(Rotation::HOURLY),
        "daily" => Ok(Rotation::DAILY),
        "never" => Ok(Rotation::NEVER),
        other => Err(LoggingError::UnknownRotation(other.to_string())),
    }
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> Result<WorkerGuard, LoggingError> {
    let file_appender = RollingFileAppender::new(
        rotation(&config.rotation)?,
        &config.log_dir,
        &config.log_file,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).try_init()?;
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).try_init()?;
    }

    Ok(guard)
}
