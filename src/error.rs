//! Error handling for the AIS forwarder
//!
//! This module defines the error taxonomy shared by the forwarding pipeline
//! and a Result alias used throughout the crate. Only [`ForwarderError::Config`]
//! ever escapes to the process entry point; every other variant is absorbed
//! and retried inside the pipeline loops.

use thiserror::Error;

/// Main error type for forwarder operations
#[derive(Error, Debug)]
pub enum ForwarderError {
    /// Missing or invalid configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serial device could not be opened or read
    #[error("Serial error: {0}")]
    Serial(String),

    /// TCP connect or send failure
    #[error("Network error: {0}")]
    Network(#[source] std::io::Error),

    /// Channel capacity exceeded
    #[error("Queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ForwarderError>,
    },
}

impl ForwarderError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ForwarderError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error is a serial device fault, looking through context wrappers
    pub fn is_serial_fault(&self) -> bool {
        match self {
            ForwarderError::Serial(_) => true,
            ForwarderError::WithContext { source, .. } => source.is_serial_fault(),
            _ => false,
        }
    }
}

impl From<serialport::Error> for ForwarderError {
    fn from(err: serialport::Error) -> Self {
        ForwarderError::Serial(err.to_string())
    }
}

impl From<toml::de::Error> for ForwarderError {
    fn from(err: toml::de::Error) -> Self {
        ForwarderError::Config(err.message().to_string())
    }
}

/// Result type alias for forwarder operations
pub type Result<T> = std::result::Result<T, ForwarderError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
