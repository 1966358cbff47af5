//! Logging setup
//!
//! Console output is always on. When `log_file` is configured, a second layer
//! writes to a rotating file through a non-blocking writer; the returned
//! [`WorkerGuard`] must be held until shutdown so buffered lines are flushed.
//! If the file cannot be set up, a warning is logged and only the console
//! layer is installed.
//!
//! The file is rotated by size (`log_max_size`, keeping `log_backup_count`
//! numbered backups) or by time period, depending on `log_rotation`.
//!
//! `RUST_LOG` overrides the configured level when set.

use crate::config::{ForwarderConfig, LogRotation};
use crate::error::{ForwarderError, Result};
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use std::io::Write;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
pub fn init(config: &ForwarderConfig) -> Result<Option<WorkerGuard>> {
    let configured = level_directive(&config.log_level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or("info")));

    let mut file_error = None;
    let (file_layer, guard) = match &config.log_file {
        Some(path) => match file_writer(path, config) {
            Ok(appender) => {
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer().with_writer(writer).with_ansi(false);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                file_error = Some(e);
                (None, None)
            }
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| ForwarderError::Config(format!("Failed to initialise logging: {}", e)))?;

    // Reported through the console layer installed above
    if configured.is_none() {
        tracing::warn!("Unknown log level '{}', using INFO", config.log_level);
    }
    if let Some(e) = file_error {
        tracing::warn!("File logging disabled: {}", e);
    }

    Ok(guard)
}

/// Map a configured level name to a filter directive.
///
/// Accepts the classic names (`WARNING`, `CRITICAL`) as well as tracing's.
pub fn level_directive(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some("trace"),
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARN" | "WARNING" => Some("warn"),
        "ERROR" | "CRITICAL" => Some("error"),
        _ => None,
    }
}

/// Writer for the configured log file and rotation policy
pub fn file_writer(path: &Path, config: &ForwarderConfig) -> Result<Box<dyn Write + Send>> {
    match config.log_rotation {
        LogRotation::Size => Ok(Box::new(size_appender(
            path,
            config.log_max_size,
            config.log_backup_count,
        )?)),
        period => Ok(Box::new(file_appender(path, period, config.log_backup_count)?)),
    }
}

fn period(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never | LogRotation::Size => Rotation::NEVER,
    }
}

fn log_dir(path: &Path) -> Result<&Path> {
    if path.file_name().is_none() {
        return Err(ForwarderError::Config(format!(
            "Invalid log file path: {}",
            path.display()
        )));
    }
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| {
        ForwarderError::Config(format!(
            "Failed to create log directory {}: {}",
            dir.display(),
            e
        ))
    })?;
    Ok(dir)
}

/// Appender that moves `path` to `path.1` once it grows past `max_size` bytes.
///
/// Older backups shift up by one; at most `backups` are kept.
pub fn size_appender(path: &Path, max_size: u64, backups: usize) -> Result<FileRotate<AppendCount>> {
    log_dir(path)?;

    // FileRotate swallows open errors, so surface them here
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ForwarderError::Config(format!("Failed to open log file {}: {}", path.display(), e)))?;

    let limit = usize::try_from(max_size).unwrap_or(usize::MAX);
    Ok(FileRotate::new(
        path,
        AppendCount::new(backups),
        ContentLimit::BytesSurpassed(limit),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}

/// Time-based appender for `path`, keeping `backups` old files besides the live one
pub fn file_appender(
    path: &Path,
    rotation: LogRotation,
    backups: usize,
) -> Result<RollingFileAppender> {
    let dir = log_dir(path)?;
    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            ForwarderError::Config(format!("Invalid log file path: {}", path.display()))
        })?;

    RollingFileAppender::builder()
        .rotation(period(rotation))
        .filename_prefix(prefix)
        .max_log_files(backups.saturating_add(1))
        .build(dir)
        .map_err(|e| ForwarderError::Config(format!("Failed to open log file {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(path: &Path, rotation: LogRotation, max_size: u64) -> ForwarderConfig {
        let mut config = ForwarderConfig::from_toml_str(
            "[AIS]\nserial_port = \"/dev/ttyUSB0\"\nip = \"127.0.0.1\"\nport = 10110\n",
        )
        .unwrap();
        config.log_file = Some(path.to_path_buf());
        config.log_rotation = rotation;
        config.log_max_size = max_size;
        config
    }

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("DEBUG"), Some("debug"));
        assert_eq!(level_directive("info"), Some("info"));
        assert_eq!(level_directive(" WARNING "), Some("warn"));
        assert_eq!(level_directive("CRITICAL"), Some("error"));
        assert_eq!(level_directive("verbose"), None);
        assert_eq!(level_directive(""), None);
    }

    #[test]
    fn test_file_appender_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("forwarder.log");

        let mut appender = file_appender(&path, LogRotation::Never, 5).unwrap();
        appender.write_all(b"hello\n").unwrap();
        appender.flush().unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "hello\n");
    }

    #[test]
    fn test_file_appender_rejects_bare_root() {
        assert!(file_appender(Path::new("/"), LogRotation::Daily, 5).is_err());
        assert!(size_appender(Path::new("/"), 1024, 5).is_err());
    }

    #[test]
    fn test_size_appender_rotates_past_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("forwarder.log");
        let config = config_for(&path, LogRotation::Size, 32);

        let mut writer = file_writer(&path, &config).unwrap();
        writer.write_all(&[b'a'; 40]).unwrap();
        writer.write_all(b"after rotation\n").unwrap();
        writer.flush().unwrap();

        let backup = dir.path().join("logs").join("forwarder.log.1");
        assert_eq!(std::fs::read(&backup).unwrap(), vec![b'a'; 40]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "after rotation\n");
    }

    #[test]
    fn test_size_appender_stays_put_below_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forwarder.log");
        let config = config_for(&path, LogRotation::Size, 1024);

        let mut writer = file_writer(&path, &config).unwrap();
        writer.write_all(b"one\n").unwrap();
        writer.write_all(b"two\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
        assert!(!dir.path().join("forwarder.log.1").exists());
    }

    #[test]
    fn test_size_appender_keeps_configured_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forwarder.log");

        let mut appender = size_appender(&path, 8, 2).unwrap();
        for n in 0..5u8 {
            appender.write_all(&[b'0' + n; 10]).unwrap();
        }
        appender.flush().unwrap();

        assert!(dir.path().join("forwarder.log.1").exists());
        assert!(dir.path().join("forwarder.log.2").exists());
        assert!(!dir.path().join("forwarder.log.3").exists());
    }
}
