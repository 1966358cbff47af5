//! Configuration module for the AIS forwarder
//!
//! The configuration lives in a TOML file with a single `[AIS]` table:
//!
//! ```toml
//! [AIS]
//! serial_port = "/dev/ttyUSB0"
//! ip = "192.168.1.50"
//! port = 10110
//! baudrate = 38400
//! serial_timeout = 2.0
//! log_level = "INFO"
//! log_file = "/var/log/ais-forwarder/forwarder.log"
//! log_rotation = "size"
//! log_max_size = 10485760
//! log_backup_count = 5
//! ```
//!
//! Only `serial_port`, `ip` and `port` are required. Any problem with the
//! file is reported as [`ForwarderError::Config`], which is fatal at startup.

use crate::backend::source::SerialSettings;
use crate::error::{ForwarderError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file used when no path is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ais-forwarder/ais_config.toml";

/// Default serial baud rate (standard for AIS receivers)
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Default serial read timeout in seconds
pub const DEFAULT_SERIAL_TIMEOUT_SECS: f64 = 2.0;

/// Default number of rotated log files kept
pub const DEFAULT_LOG_BACKUP_COUNT: usize = 5;

/// Default size in bytes at which the log file is rotated
pub const DEFAULT_LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// When the log file is rotated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// Once the file grows past `log_max_size` bytes
    #[default]
    Size,
    Minutely,
    Hourly,
    Daily,
    Never,
}

/// Forwarder configuration, validated on load
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwarderConfig {
    /// Serial device path
    pub serial_port: String,

    /// TCP host name or address
    pub ip: String,

    /// TCP port
    pub port: u16,

    /// Serial baud rate
    #[serde(default = "default_baud_rate", rename = "baudrate")]
    pub baud_rate: u32,

    /// Serial read timeout in seconds
    #[serde(default = "default_serial_timeout")]
    pub serial_timeout: f64,

    /// Reserved; the pipeline retries indefinitely
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Log level name (TRACE, DEBUG, INFO, WARNING, ERROR, CRITICAL)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional log file; console logging is always on
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Rotation policy of the log file
    #[serde(default)]
    pub log_rotation: LogRotation,

    /// Size limit in bytes for [`LogRotation::Size`]
    #[serde(default = "default_log_max_size")]
    pub log_max_size: u64,

    /// Number of rotated log files kept
    #[serde(default = "default_log_backup_count")]
    pub log_backup_count: usize,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_serial_timeout() -> f64 {
    DEFAULT_SERIAL_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_backup_count() -> usize {
    DEFAULT_LOG_BACKUP_COUNT
}

fn default_log_max_size() -> u64 {
    DEFAULT_LOG_MAX_SIZE
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(rename = "AIS")]
    ais: Option<ForwarderConfig>,
}

impl ForwarderConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForwarderError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ForwarderError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        let config = file
            .ais
            .ok_or_else(|| ForwarderError::Config("Missing 'AIS' section in config file".to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.serial_port.trim().is_empty() {
            return Err(ForwarderError::Config("'serial_port' must not be empty".to_string()));
        }
        if self.ip.trim().is_empty() {
            return Err(ForwarderError::Config("'ip' must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ForwarderError::Config("'port' must be between 1 and 65535".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ForwarderError::Config("'baudrate' must be positive".to_string()));
        }
        if !self.serial_timeout.is_finite() || self.serial_timeout <= 0.0 {
            return Err(ForwarderError::Config(format!(
                "'serial_timeout' must be a positive number of seconds, got {}",
                self.serial_timeout
            )));
        }
        Duration::try_from_secs_f64(self.serial_timeout).map_err(|e| {
            ForwarderError::Config(format!(
                "'serial_timeout' of {} seconds is out of range: {}",
                self.serial_timeout, e
            ))
        })?;
        if self.log_max_size == 0 {
            return Err(ForwarderError::Config("'log_max_size' must be positive".to_string()));
        }
        Ok(())
    }

    /// Serial read timeout as a Duration
    ///
    /// Falls back to the default for values [`validate`](Self::validate) rejects.
    pub fn serial_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.serial_timeout)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(Duration::from_secs_f64(DEFAULT_SERIAL_TIMEOUT_SECS))
    }

    /// Settings for opening the serial port
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            path: self.serial_port.clone(),
            baud_rate: self.baud_rate,
            timeout: self.serial_timeout(),
        }
    }

    /// `host:port` of the TCP endpoint
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
