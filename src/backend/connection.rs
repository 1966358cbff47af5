//! Outbound TCP link with reconnect throttling.
//!
//! [`ConnectionManager`] hides the connect/reconnect cycle behind a single
//! `send(&[u8]) -> bool`. A failed connect grows the backoff delay; a failed
//! write drops the socket and marks the link disconnected so the next `send`
//! reconnects. Retrying a failed payload is the caller's job.
//!
//! All socket and state access happens under one mutex, held for the whole
//! connect, send or close. `send` performs its implicit connect under the same
//! lock acquisition.
//!
//! Opening the byte sink is delegated to a [`Connector`] so the state machine
//! can be exercised without a network.

use crate::backend::backoff::{Backoff, BackoffPolicy};
use crate::error::ForwarderError;
use crate::types::ConnectionState;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Connect and write timeout for the TCP socket
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens outbound byte sinks.
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send + Sync {
    /// Open a new sink, giving up after `timeout`
    fn connect(&self, timeout: Duration) -> io::Result<Box<dyn Write + Send>>;

    /// Human readable endpoint for log messages
    fn endpoint(&self) -> String;
}

/// [`Connector`] for a TCP `host:port`
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, timeout: Duration) -> io::Result<Box<dyn Write + Send>> {
        let timeout = timeout.max(Duration::from_millis(1));
        let mut last_err = None;

        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    return Ok(Box::new(stream));
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no addresses resolved for {}", self.endpoint()),
            )
        }))
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct Link {
    stream: Option<Box<dyn Write + Send>>,
    state: ConnectionState,
    backoff: Backoff,
}

/// Owns the single outbound connection and its backoff state.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    endpoint: String,
    io_timeout: Duration,
    link: Mutex<Link>,
}

impl ConnectionManager {
    /// Manager with the default backoff policy and I/O timeout
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self::with_policy(connector, BackoffPolicy::default(), DEFAULT_IO_TIMEOUT)
    }

    /// Manager connecting to `host:port` over TCP
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(TcpConnector::new(host, port))
    }

    pub fn with_policy(
        connector: impl Connector + 'static,
        policy: BackoffPolicy,
        io_timeout: Duration,
    ) -> Self {
        let endpoint = connector.endpoint();
        Self {
            connector: Box::new(connector),
            endpoint,
            io_timeout,
            link: Mutex::new(Link {
                stream: None,
                state: ConnectionState::Disconnected,
                backoff: Backoff::new(policy),
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current minimum spacing between connect attempts
    pub fn backoff_delay(&self) -> Duration {
        self.link.lock().backoff.delay()
    }

    /// Time until the next connect attempt is permitted; zero when connected
    pub fn retry_after(&self) -> Duration {
        let link = self.link.lock();
        match link.state {
            ConnectionState::Connected => Duration::ZERO,
            ConnectionState::Disconnected => link.backoff.remaining(Instant::now()),
        }
    }

    /// Connect if not connected and the backoff delay has elapsed.
    ///
    /// Returns `true` if the link is connected afterwards. Returns `false`
    /// without any I/O while the backoff delay is still running.
    pub fn connect(&self) -> bool {
        let mut link = self.link.lock();
        self.connect_locked(&mut link)
    }

    fn connect_locked(&self, link: &mut Link) -> bool {
        if link.state == ConnectionState::Connected {
            return true;
        }

        let now = Instant::now();
        if !link.backoff.ready(now) {
            tracing::trace!(
                "Connect to {} throttled for another {:?}",
                self.endpoint,
                link.backoff.remaining(now)
            );
            return false;
        }
        link.backoff.mark_attempt(now);

        // Release any stale socket before opening a new one
        link.stream = None;

        match self.connector.connect(self.io_timeout) {
            Ok(stream) => {
                link.stream = Some(stream);
                link.state = ConnectionState::Connected;
                link.backoff.record_success();
                tracing::info!("Connected to {}", self.endpoint);
                true
            }
            Err(e) => {
                link.state = ConnectionState::Disconnected;
                link.backoff.record_failure();
                tracing::warn!(
                    "Failed to connect to {}: {} (next attempt in {:.1}s)",
                    self.endpoint,
                    ForwarderError::Network(e),
                    link.backoff.delay().as_secs_f64()
                );
                false
            }
        }
    }

    /// Write all of `data`, connecting first if needed.
    ///
    /// A failed or partial write marks the link disconnected and returns
    /// `false`; nothing is retried here.
    pub fn send(&self, data: &[u8]) -> bool {
        let mut link = self.link.lock();
        if !self.connect_locked(&mut link) {
            return false;
        }

        let result = match link.stream.as_mut() {
            Some(stream) => stream.write_all(data).and_then(|()| stream.flush()),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "no socket")),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "Error sending data to {}: {}",
                    self.endpoint,
                    ForwarderError::Network(e)
                );
                link.stream = None;
                link.state = ConnectionState::Disconnected;
                false
            }
        }
    }

    /// Drop the socket and mark the link disconnected. Safe to call repeatedly.
    pub fn close(&self) {
        let mut link = self.link.lock();
        self.close_locked(&mut link);
    }

    /// Like [`close`](Self::close), but gives up if a send in progress holds
    /// the link for longer than `timeout`. Returns `false` in that case.
    pub fn close_within(&self, timeout: Duration) -> bool {
        match self.link.try_lock_for(timeout) {
            Some(mut link) => {
                self.close_locked(&mut link);
                true
            }
            None => false,
        }
    }

    fn close_locked(&self, link: &mut Link) {
        if link.stream.take().is_some() {
            tracing::debug!("Closed connection to {}", self.endpoint);
        }
        link.state = ConnectionState::Disconnected;
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}
