//! Logging setup for hosts that do not bring their own subscriber
//!
//! The library only emits `tracing` events. Binaries can call [`init`] to
//! send them to `~/.local/state/calq/calq.log`, rotated daily.

use crate::config::{Config, LoggingConfig};
use crate::error::Result;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name of the log inside the state directory
pub const LOG_FILE_NAME: &str = "calq.log";

/// Keeps the background log writer alive; pending lines are flushed on drop
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// `RUST_LOG` wins over the configured level
fn filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Route calq's events to the daily-rotated log file.
///
/// If the host already installed a global subscriber, that one is kept and
/// the file is not written.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let installed = tracing_subscriber::registry()
        .with(filter(config))
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            log_file = %Config::log_path().display(),
            level = %config.level,
            "Logging initialized"
        );
    } else {
        tracing::debug!("Subscriber already installed, not writing calq log file");
    }

    Ok(LoggingGuard { _guard: guard })
}

/// Print events through the test harness. Safe to call from every test.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
