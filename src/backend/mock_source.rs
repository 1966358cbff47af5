//! Scripted serial source for testing without hardware.
//!
//! [`MockSource`] is a [`SourceOpener`] whose ports read from an in-memory
//! feed. The paired [`MockSourceHandle`] pushes data into the feed, injects
//! device faults, makes opens fail, and reports how many ports are open.
//!
//! # Example
//!
//! ```ignore
//! use ais_forwarder::backend::MockSource;
//! use std::time::Duration;
//!
//! let source = MockSource::new(Duration::from_millis(50));
//! let handle = source.handle();
//!
//! handle.push_line("!AIVDM,1,1,,B,15MgK45P3@G?fl0E`JbR0OwT0@MS,0*4E\r\n");
//! handle.inject_fault("device unplugged");
//! ```

use crate::backend::source::SourceOpener;
use crate::error::{ForwarderError, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::io::{self, Read};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

enum FeedEvent {
    Data(Vec<u8>),
    Fault(String),
}

struct Shared {
    feed_tx: Sender<FeedEvent>,
    feed_rx: Receiver<FeedEvent>,
    read_timeout: Duration,
    failing_opens: AtomicU32,
    opens: AtomicU64,
    open_ports: AtomicUsize,
}

/// In-memory [`SourceOpener`]
#[derive(Clone)]
pub struct MockSource {
    shared: Arc<Shared>,
}

impl MockSource {
    /// Create a source whose reads time out after `read_timeout`
    pub fn new(read_timeout: Duration) -> Self {
        let (feed_tx, feed_rx) = unbounded();
        Self {
            shared: Arc::new(Shared {
                feed_tx,
                feed_rx,
                read_timeout,
                failing_opens: AtomicU32::new(0),
                opens: AtomicU64::new(0),
                open_ports: AtomicUsize::new(0),
            }),
        }
    }

    /// Controller for this source
    pub fn handle(&self) -> MockSourceHandle {
        MockSourceHandle {
            shared: self.shared.clone(),
        }
    }
}

impl SourceOpener for MockSource {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let failing = self
            .shared
            .failing_opens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ForwarderError::Serial(
                "mock device not present".to_string(),
            ));
        }

        self.shared.opens.fetch_add(1, Ordering::AcqRel);
        self.shared.open_ports.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MockPort {
            shared: self.shared.clone(),
            pending: Vec::new(),
        }))
    }

    fn describe(&self) -> String {
        "mock serial port".to_string()
    }
}

/// Test-side controller of a [`MockSource`]
#[derive(Clone)]
pub struct MockSourceHandle {
    shared: Arc<Shared>,
}

impl MockSourceHandle {
    /// Queue raw bytes for the port to return
    pub fn push_bytes(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.shared.feed_tx.send(FeedEvent::Data(bytes.into()));
    }

    /// Queue one line; the caller supplies the terminator
    pub fn push_line(&self, line: impl AsRef<[u8]>) {
        self.push_bytes(line.as_ref().to_vec());
    }

    /// Make the next read fail with an I/O error
    pub fn inject_fault(&self, message: impl Into<String>) {
        let _ = self.shared.feed_tx.send(FeedEvent::Fault(message.into()));
    }

    /// Make the next `count` opens fail
    pub fn fail_next_opens(&self, count: u32) {
        self.shared.failing_opens.store(count, Ordering::Release);
    }

    /// Successful opens so far
    pub fn open_count(&self) -> u64 {
        self.shared.opens.load(Ordering::Acquire)
    }

    /// Ports currently held open
    pub fn open_ports(&self) -> usize {
        self.shared.open_ports.load(Ordering::Acquire)
    }

    /// Feed events not yet consumed by a port
    pub fn pending(&self) -> usize {
        self.shared.feed_rx.len()
    }
}

struct MockPort {
    shared: Arc<Shared>,
    pending: Vec<u8>,
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.shared.feed_rx.recv_timeout(self.shared.read_timeout) {
                Ok(FeedEvent::Data(bytes)) => self.pending = bytes,
                Ok(FeedEvent::Fault(message)) => return Err(io::Error::other(message)),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "mock read timed out"))
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl Drop for MockPort {
    fn drop(&mut self) {
        self.shared.open_ports.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::source::SourceReader;
    use crate::types::Record;

    #[test]
    fn test_lines_flow_through_reader() {
        let source = MockSource::new(Duration::from_millis(20));
        let handle = source.handle();
        handle.push_line("A\n");
        handle.push_bytes("B");
        handle.push_bytes("\n");

        let mut reader = SourceReader::new(Arc::new(source));
        reader.ensure_open().unwrap();
        assert_eq!(handle.open_ports(), 1);

        assert_eq!(reader.read_one().unwrap(), Some(Record::from("A\n")));
        assert_eq!(reader.read_one().unwrap(), Some(Record::from("B\n")));
        assert_eq!(reader.read_one().unwrap(), None);

        reader.close();
        assert_eq!(handle.open_ports(), 0);
    }

    #[test]
    fn test_fault_and_failing_open() {
        let source = MockSource::new(Duration::from_millis(20));
        let handle = source.handle();
        handle.fail_next_opens(1);

        let mut reader = SourceReader::new(Arc::new(source));
        assert!(reader.ensure_open().is_err());
        assert!(reader.ensure_open().is_ok());
        assert_eq!(handle.open_count(), 1);

        handle.inject_fault("unplugged");
        assert!(reader.read_one().unwrap_err().is_serial_fault());
        assert!(!reader.is_open());
        assert_eq!(handle.open_ports(), 0);
    }
}
