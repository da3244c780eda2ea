//! Logging setup with journald support on Linux.
//!
//! Log level is controlled via the `MEDIASHELF_LOG` environment variable
//! (`debug`, `info` (default), `warn`, `error`, or any `EnvFilter` directive).

use anyhow::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Handle for the installed subscriber.
///
/// Keep it alive for the lifetime of the process; dropping it flushes and
/// stops the background writer of the file backend.
#[must_use = "dropping the handle stops file logging"]
pub struct LoggingHandle {
    _guard: Option<WorkerGuard>,
}

/// Initialize the logging system.
///
/// On Linux this tries systemd-journald first. Otherwise logs go to a daily
/// rolling file in `log_dir` (or the data directory when `None`).
pub fn init(log_dir: Option<PathBuf>) -> Result<LoggingHandle> {
    let env_filter = EnvFilter::try_from_env("MEDIASHELF_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer)
                .try_init()?;

            tracing::info!("Logging initialized with journald backend");
            return Ok(LoggingHandle { _guard: None });
        }
    }

    let log_dir = log_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediashelf")
            .join("logs")
    });

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "mediashelf.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()?;

    tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    Ok(LoggingHandle {
        _guard: Some(guard),
    })
}

/// Plain stderr logging, used by the one-shot `scan` command.
pub fn init_stderr() -> Result<()> {
    let env_filter = EnvFilter::try_from_env("MEDIASHELF_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}
