//! Serial source of line records.
//!
//! [`SourceReader`] owns the device handle and turns the raw byte stream into
//! [`Record`]s, one per newline-terminated line. Opening the device goes
//! through a [`SourceOpener`] so the reader works the same against a real
//! port ([`SerialPortOpener`]) and a scripted one
//! ([`MockSource`](crate::backend::mock_source::MockSource)).
//!
//! # Read semantics
//!
//! - A read blocks for at most the device's read timeout.
//! - A timeout with no complete line is not an error; bytes received so far
//!   are kept and completed by later reads.
//! - A line is never buffered past [`MAX_LINE_LEN`] bytes; at that length the
//!   bytes are emitted as a record without a terminator.
//! - End-of-stream or any other I/O error is a device fault: the handle is
//!   closed and the error is reported so the caller can back off and reopen.

use crate::error::{ForwarderError, Result, ResultExt};
use crate::types::Record;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::Arc;
use std::time::Duration;

/// Longest unterminated line kept before it is emitted as-is
pub const MAX_LINE_LEN: usize = 4096;

/// Opens the byte stream of a serial device.
pub trait SourceOpener: Send + Sync {
    /// Open the device. The returned reader must time out its reads.
    fn open(&self) -> Result<Box<dyn Read + Send>>;

    /// Device name for log messages
    fn describe(&self) -> String;
}

/// Serial port settings used by [`SerialPortOpener`]
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyUSB0`
    pub path: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout
    pub timeout: Duration,
}

/// [`SourceOpener`] backed by the `serialport` crate
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    settings: SerialSettings,
}

impl SerialPortOpener {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

impl SourceOpener for SerialPortOpener {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let port = serialport::new(&self.settings.path, self.settings.baud_rate)
            .timeout(self.settings.timeout)
            .open()?;
        Ok(Box::new(port))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.settings.path, self.settings.baud_rate)
    }
}

/// Owns the serial handle and yields complete lines.
pub struct SourceReader {
    opener: Arc<dyn SourceOpener>,
    handle: Option<BufReader<Box<dyn Read + Send>>>,
    line: Vec<u8>,
}

impl SourceReader {
    pub fn new(opener: Arc<dyn SourceOpener>) -> Self {
        Self {
            opener,
            handle: None,
            line: Vec::new(),
        }
    }

    pub fn describe(&self) -> String {
        self.opener.describe()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Open the device if no handle is held.
    ///
    /// On failure the handle stays absent; the caller decides how long to
    /// wait before trying again.
    pub fn ensure_open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let port = self
            .opener
            .open()
            .with_context(|| format!("Failed to connect to serial port {}", self.opener.describe()))?;
        self.handle = Some(BufReader::new(port));
        self.line.clear();
        tracing::info!("Connected to AIS serial port: {}", self.opener.describe());
        Ok(())
    }

    /// Read until one complete line is available or the read times out.
    ///
    /// Returns `Ok(None)` on timeout. A device fault closes the handle and
    /// returns [`ForwarderError::Serial`].
    pub fn read_one(&mut self) -> Result<Option<Record>> {
        let Some(reader) = self.handle.as_mut() else {
            return Err(ForwarderError::Serial("serial port is not open".to_string()));
        };

        // Never buffer more than MAX_LINE_LEN bytes of one line
        let budget = MAX_LINE_LEN.saturating_sub(self.line.len()) as u64;
        let read = reader.by_ref().take(budget).read_until(b'\n', &mut self.line);
        match read {
            Ok(_) if self.line.ends_with(b"\n") => Ok(Some(self.take_line())),
            Ok(_) if self.line.len() >= MAX_LINE_LEN => Ok(Some(self.take_oversized())),
            Ok(0) => {
                self.close();
                Err(ForwarderError::Serial(format!(
                    "end of stream on {}",
                    self.opener.describe()
                )))
            }
            Ok(partial) => {
                self.close();
                Err(ForwarderError::Serial(format!(
                    "end of stream on {} after {} bytes of an incomplete line",
                    self.opener.describe(),
                    partial
                )))
            }
            Err(e) if is_idle(&e) => Ok(None),
            Err(e) => {
                self.close();
                Err(ForwarderError::Serial(format!(
                    "read error on {}: {}",
                    self.opener.describe(),
                    e
                )))
            }
        }
    }

    /// Release the handle if open. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            tracing::debug!("Closed serial port {}", self.opener.describe());
        }
        self.line.clear();
    }

    fn take_line(&mut self) -> Record {
        Record::from(std::mem::take(&mut self.line))
    }

    fn take_oversized(&mut self) -> Record {
        tracing::debug!(
            "Emitting {} bytes without a line terminator",
            self.line.len()
        );
        self.take_line()
    }
}

impl Drop for SourceReader {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
