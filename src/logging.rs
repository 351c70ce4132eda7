//! Tracing subscriber setup
//!
//! Log lines go to stdout and, when configured, to a file sink with hourly
//! or daily rotation. The level comes from the configuration file unless
//! `FIELDSCAN_LOG_LEVEL` overrides it.

use crate::config::{LogRotation, LoggingOptions};
use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

// Keeps the non-blocking writer's flush thread alive for the process lifetime.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global tracing subscriber.
///
/// A no-op when a subscriber is already in place, so tests and embedding
/// callers can configure their own.
pub fn init(options: &LoggingOptions) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let level = std::env::var("FIELDSCAN_LOG_LEVEL").unwrap_or_else(|_| options.level.clone());
    let filter = EnvFilter::try_new(level.as_str())
        .map_err(|e| Error::Config(format!("Bad log level '{level}': {e}")))?;

    let stdout = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_ansi(options.color)
        .with_writer(std::io::stdout);

    let file = file_writer(options)?.map(|writer| {
        fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_ansi(false)
            .with_writer(writer)
    });

    Registry::default()
        .with(filter)
        .with(file)
        .with(stdout)
        .try_init()
        .map_err(|e| Error::Config(format!("Could not install tracing subscriber: {e}")))
}

fn file_writer(options: &LoggingOptions) -> Result<Option<NonBlocking>> {
    let Some(path) = options.file.as_ref() else {
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| {
        Error::Config(format!(
            "Could not create log directory {}: {e}",
            dir.display()
        ))
    })?;

    let builder = NonBlockingBuilder::default().lossy(false);
    let (writer, guard) = match options.rotation {
        Some(LogRotation::Hourly) => builder.finish(rolling::hourly(dir, rotation_prefix(path)?)),
        Some(LogRotation::Daily) => builder.finish(rolling::daily(dir, rotation_prefix(path)?)),
        None => {
            let file = File::options()
                .append(true)
                .create(true)
                .open(path)
                .map_err(|e| {
                    Error::Config(format!("Could not open log file {}: {e}", path.display()))
                })?;
            builder.finish(file)
        }
    };

    let _ = FILE_GUARD.set(guard);
    Ok(Some(writer))
}

fn rotation_prefix(path: &Path) -> Result<&OsStr> {
    path.file_name().ok_or_else(|| {
        Error::Config(format!(
            "Log file path '{}' needs a filename for rotation",
            path.display()
        ))
    })
}
