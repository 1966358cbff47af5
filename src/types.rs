//! Core data types for the forwarder
//!
//! - [`Record`] - One opaque line captured from the serial device
//! - [`ConnectionState`] - State of the outbound TCP connection
//! - [`PipelineStats`] / [`PipelineSnapshot`] - Counters shared by the pipeline loops

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// One line read from the serial device, terminator included.
///
/// The payload is never decoded; it is forwarded byte-for-byte.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Record(Box<[u8]>);

impl Record {
    /// Create a record from raw bytes
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Borrow the payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the record, returning its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_vec()
    }
}

impl From<Vec<u8>> for Record {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }
}

impl From<&[u8]> for Record {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl From<&str> for Record {
    fn from(line: &str) -> Self {
        Self(line.as_bytes().into())
    }
}

impl AsRef<[u8]> for Record {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Connection status of the outbound TCP link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No usable socket
    #[default]
    Disconnected,
    /// Socket open and last operation succeeded
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// Counters updated by the read and send loops.
///
/// All counters are monotonic; take a [`PipelineSnapshot`] to read them.
#[derive(Debug, Default)]
pub struct PipelineStats {
    records_read: AtomicU64,
    records_forwarded: AtomicU64,
    send_retries: AtomicU64,
    dropped_on_enqueue: AtomicU64,
    dropped_on_requeue: AtomicU64,
    serial_faults: AtomicU64,
    recovered_panics: AtomicU64,
}

impl PipelineStats {
    pub fn record_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.records_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.send_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enqueue_drop(&self) {
        self.dropped_on_enqueue.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeue_drop(&self) {
        self.dropped_on_requeue.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_serial_fault(&self) {
        self.serial_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.recovered_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            records_read: self.records_read.load(Ordering::Relaxed),
            records_forwarded: self.records_forwarded.load(Ordering::Relaxed),
            send_retries: self.send_retries.load(Ordering::Relaxed),
            dropped_on_enqueue: self.dropped_on_enqueue.load(Ordering::Relaxed),
            dropped_on_requeue: self.dropped_on_requeue.load(Ordering::Relaxed),
            serial_faults: self.serial_faults.load(Ordering::Relaxed),
            recovered_panics: self.recovered_panics.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSnapshot {
    /// Complete lines read from the serial device
    pub records_read: u64,
    /// Records written to the TCP endpoint
    pub records_forwarded: u64,
    /// Records put back into the retry slot after a failed send
    pub send_retries: u64,
    /// Records dropped because the channel stayed full on enqueue
    pub dropped_on_enqueue: u64,
    /// Records dropped because the channel was full on re-enqueue
    pub dropped_on_requeue: u64,
    /// Serial open/read faults
    pub serial_faults: u64,
    /// Panics caught inside a loop iteration
    pub recovered_panics: u64,
}

impl PipelineSnapshot {
    /// Total records lost to capacity pressure
    pub fn dropped(&self) -> u64 {
        self.dropped_on_enqueue + self.dropped_on_requeue
    }
}

impl fmt::Display for PipelineSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read={} forwarded={} retries={} dropped={} serial_faults={}",
            self.records_read,
            self.records_forwarded,
            self.send_retries,
            self.dropped(),
            self.serial_faults
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_terminator() {
        let record = Record::from("!AIVDM,1,1,,A,13aEOK?P00PD2wVMdLDRhgvL289?,0*26\r\n");
        assert!(record.as_bytes().ends_with(b"\r\n"));
        assert_eq!(record.len(), 49);
    }

    #[test]
    fn test_record_debug_is_lossy_text() {
        let record = Record::from(vec![b'A', 0xFF, b'\n']);
        let debug = format!("{:?}", record);
        assert!(debug.starts_with("Record("));
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = PipelineStats::default();
        stats.record_read();
        stats.record_read();
        stats.record_forwarded();
        stats.record_enqueue_drop();
        stats.record_requeue_drop();

        let snap = stats.snapshot();
        assert_eq!(snap.records_read, 2);
        assert_eq!(snap.records_forwarded, 1);
        assert_eq!(snap.dropped(), 2);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::default().to_string(), "Disconnected");
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
    }
}
