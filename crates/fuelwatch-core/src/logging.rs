//! Logging setup for the `fuelwatch` binary.
//!
//! Two sinks share one [`EnvFilter`]:
//!
//! - `~/.fuelwatch/logs/fuelwatch.<date>.log`: JSON lines, rotated daily,
//!   the last [`MAX_LOG_FILES`] days kept
//! - stderr: compact text, colored only when stderr is a terminal
//!
//! `RUST_LOG` replaces the default filter entirely.
//!
//! ```no_run
//! let _guard = fuelwatch_core::init_logging(None, false).expect("logging init");
//! tracing::debug!(user_id = "42", "loading unread count");
//! ```

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

use crate::error::{FuelwatchError, Result};

/// Rotated log files kept on disk.
pub const MAX_LOG_FILES: usize = 14;

const LOG_FILE_PREFIX: &str = "fuelwatch";

/// Flushes buffered file output when dropped. Hold it until exit.
pub struct LogGuard {
    _file_guard: WorkerGuard,
}

/// Install the global subscriber.
///
/// `log_dir` defaults to `~/.fuelwatch/logs/`. Fails if the directory cannot
/// be created or a subscriber is already installed.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };
    let (writer, file_guard) = tracing_appender::non_blocking(file_appender(&log_dir)?);

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(json_file_layer(writer))
        .with(console_layer(verbose))
        .try_init()
        .map_err(|e| FuelwatchError::internal(format!("logging already initialized: {e}")))?;

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");
    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("warn,fuelwatch={level}")
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

fn file_appender(log_dir: &Path) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(log_dir).map_err(|e| FuelwatchError::DirectoryCreation {
        path: log_dir.to_path_buf(),
        source: e,
    })?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
        .map_err(|e| {
            FuelwatchError::internal(format!("cannot open log file in {}: {e}", log_dir.display()))
        })
}

fn json_file_layer<S>(writer: NonBlocking) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
        .with_current_span(true)
        .with_span_list(false)
}

fn console_layer<S>(verbose: bool) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(verbose)
        .with_file(verbose)
        .with_line_number(verbose)
}

/// Initialize minimal console-only logging for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Root directory for Fuelwatch state: `~/.fuelwatch/`
pub fn fuelwatch_home() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| FuelwatchError::Internal {
        message: "home directory could not be determined".into(),
    })?;

    Ok(home.join(".fuelwatch"))
}

/// Get the default log directory path: `~/.fuelwatch/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(fuelwatch_home()?.join("logs"))
}

/// Logs an alert-side event (count, pending list, critical scan).
///
/// # Example
///
/// ```ignore
/// log_alert_event!("count_loaded", user_id = %user_id, count = 5);
/// ```
#[macro_export]
macro_rules! log_alert_event {
    ($event:expr) => {
        tracing::info!(target: "fuelwatch::alerts", event = $event, "alert event")
    };
    ($event:expr, $($field:tt)*) => {
        tracing::info!(
            target: "fuelwatch::alerts",
            event = $event,
            $($field)*,
            "alert event"
        )
    };
}

/// Logs a notification-feed event (load, mark read, link).
///
/// # Example
///
/// ```ignore
/// log_notification_event!("marked_read", notification_id = 7);
/// ```
#[macro_export]
macro_rules! log_notification_event {
    ($event:expr) => {
        tracing::info!(target: "fuelwatch::notifications", event = $event, "notification event")
    };
    ($event:expr, $($field:tt)*) => {
        tracing::info!(
            target: "fuelwatch::notifications",
            event = $event,
            $($field)*,
            "notification event"
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_default_log_dir() {
        // SAFETY: serialized with every other test touching HOME
        unsafe { std::env::set_var("HOME", "/tmp/fuelwatch-home") };
        let dir = default_log_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/fuelwatch-home/.fuelwatch/logs"));
    }

    #[test]
    fn test_default_directives_follow_verbosity() {
        assert_eq!(default_directives(false), "warn,fuelwatch=info");
        assert_eq!(default_directives(true), "warn,fuelwatch=debug");
    }

    #[test]
    fn test_file_appender_creates_dir_and_dated_file() {
        use std::io::Write;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("logs");
        let mut appender = file_appender(&dir).unwrap();
        appender.write_all(b"{}\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("fuelwatch."), "got {names:?}");
        assert!(names[0].ends_with(".log"), "got {names:?}");
    }

    #[test]
    fn test_file_appender_rejects_unwritable_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let err = file_appender(&blocker.join("logs")).unwrap_err();
        assert!(matches!(err, FuelwatchError::DirectoryCreation { .. }));
    }

    #[test]
    fn test_init_test_logging() {
        init_test_logging();
        init_test_logging();
    }

    #[test]
    fn test_event_macros_expand() {
        init_test_logging();
        crate::log_alert_event!("count_loaded", count = 3);
        crate::log_notification_event!("feed_loaded");
    }
}
