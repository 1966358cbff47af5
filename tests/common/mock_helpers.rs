//! Fake and real network endpoints for pipeline tests

use ais_forwarder::backend::Connector;
use parking_lot::Mutex;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct EndpointState {
    received: Mutex<Vec<u8>>,
    online: AtomicBool,
    write_delay: Mutex<Duration>,
    connects: AtomicU64,
}

/// In-process [`Connector`] with an on/off switch and a per-write delay.
///
/// While offline, connects are refused and writes on existing links fail.
#[derive(Clone, Default)]
pub struct FakeEndpoint {
    state: Arc<EndpointState>,
}

impl FakeEndpoint {
    pub fn online() -> Self {
        let endpoint = Self::default();
        endpoint.set_online(true);
        endpoint
    }

    pub fn offline() -> Self {
        Self::default()
    }

    pub fn set_online(&self, online: bool) {
        self.state.online.store(online, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.state.write_delay.lock() = delay;
    }

    /// Successful connects so far
    pub fn connects(&self) -> u64 {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Everything written so far
    pub fn received(&self) -> Vec<u8> {
        self.state.received.lock().clone()
    }

    /// Received lines, terminators stripped
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.state.received.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn line_count(&self) -> usize {
        self.state.received.lock().iter().filter(|&&b| b == b'\n').count()
    }
}

impl Connector for FakeEndpoint {
    fn connect(&self, _timeout: Duration) -> io::Result<Box<dyn Write + Send>> {
        if !self.state.online.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "endpoint offline"));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeLink {
            state: self.state.clone(),
        }))
    }

    fn endpoint(&self) -> String {
        "fake-endpoint:0".to_string()
    }
}

struct FakeLink {
    state: Arc<EndpointState>,
}

impl Write for FakeLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let delay = *self.state.write_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if !self.state.online.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "endpoint went away"));
        }
        self.state.received.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A loopback port that nothing listens on yet
pub fn unused_local_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr")
}

/// Real TCP listener collecting every line it receives.
///
/// Accepts any number of connections; stops its threads on drop.
pub struct TcpCollector {
    lines: Arc<Mutex<Vec<String>>>,
    stop: Arc<AtomicBool>,
}

impl TcpCollector {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        let lines = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let accept_lines = lines.clone();
        let accept_stop = stop.clone();
        thread::spawn(move || {
            while !accept_stop.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let lines = accept_lines.clone();
                        let stop = accept_stop.clone();
                        thread::spawn(move || read_lines(stream, lines, stop));
                    }
                    Err(_) => thread::sleep(Duration::from_millis(5)),
                }
            }
        });

        Ok(Self { lines, stop })
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl Drop for TcpCollector {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn read_lines(stream: TcpStream, lines: Arc<Mutex<Vec<String>>>, stop: Arc<AtomicBool>) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(Duration::from_millis(50)));
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    while !stop.load(Ordering::SeqCst) {
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) if line.ends_with('\n') => {
                lines.lock().push(line.trim_end().to_string());
                line.clear();
            }
            Ok(_) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(_) => break,
        }
    }
}
