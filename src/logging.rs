/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingSettings;
use crate::error::{AzError, Result};

/// Filter directive used when `RUST_LOG` is unset
pub fn default_directive(level: Level) -> String {
    format!("az_failure={}", level.as_str().to_ascii_lowercase())
}

/// Initialize structured logging from the `[logging]` settings.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more
/// than once is harmless; later calls leave the first subscriber in place.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let level = settings.level.to_tracing_level();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(level)))
        .map_err(|e| AzError::Validation(format!("Failed to create log filter: {}", e)))?;

    match settings.file {
        Some(ref log_path) => init_file_logging(log_path, env_filter),
        None => {
            init_console_logging(env_filter);
            Ok(())
        }
    }
}

/// Compact human-readable output on stderr
fn init_console_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .ok();
}

/// JSON lines to a file, one object per event
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = File::create(log_path).map_err(|e| AzError::StateIo {
        path: log_path.to_path_buf(),
        source: e,
    })?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .ok();

    Ok(())
}

/// Initialize logging for tests; safe to call from every test
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("az_failure=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(true).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use tempfile::TempDir;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(Level::INFO), "az_failure=info");
        assert_eq!(default_directive(Level::TRACE), "az_failure=trace");
    }

    #[test]
    fn test_log_file_is_created() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("az-failure.log");
        let settings = LoggingSettings {
            level: LogLevel::Debug,
            file: Some(log_path.clone()),
        };

        init_logging(&settings).unwrap();
        assert!(log_path.exists());
    }

    #[test]
    fn test_unwritable_log_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let settings = LoggingSettings {
            level: LogLevel::Info,
            file: Some(dir.path().join("missing").join("az-failure.log")),
        };
        assert!(init_logging(&settings).is_err());
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), Level::ERROR);
        assert_eq!(LogLevel::Warn.to_tracing_level(), Level::WARN);
        assert_eq!(LogLevel::Info.to_tracing_level(), Level::INFO);
        assert_eq!(LogLevel::Debug.to_tracing_level(), Level::DEBUG);
        assert_eq!(LogLevel::Trace.to_tracing_level(), Level::TRACE);
    }
}
