//! Forwarding pipeline: serial read loop and TCP send loop.
//!
//! This module contains the two worker loops and the start/stop lifecycle
//! that coordinates them around a shared [`BoundedChannel`].
//!
//! # Loops
//!
//! - **Read loop** (`ais-reader` thread): keeps the serial port open, reads
//!   complete lines and enqueues them with a bounded wait. A record that still
//!   finds the channel full is dropped.
//! - **Send loop** (`ais-sender` thread): dequeues with a bounded wait and
//!   hands each record to the [`ConnectionManager`]. A record whose send
//!   fails goes back to the head of the channel so it is retried before
//!   anything that arrived after it; if there is no room it is dropped.
//!
//! # Shutdown
//!
//! Both loops poll a per-run `AtomicBool`. Every blocking call in either loop
//! is bounded (serial read timeout, channel waits, socket timeouts), and every
//! sleep is sliced so it ends early once the flag clears. `stop()` clears the
//! flag and waits for each loop up to [`PipelineTuning::join_timeout`]; a loop
//! that misses the deadline is abandoned and exits on its own once its
//! in-flight call returns. Each loop releases its own resource on exit: the
//! read loop closes the serial port, the send loop closes the socket.
//!
//! # Failure handling
//!
//! Serial faults close the port and retry after a fixed delay. Network faults
//! are absorbed by the connection manager's backoff. Any other error, and any
//! panic inside one loop iteration, is logged and followed by a short pause.

use crate::backend::channel::{BoundedChannel, Full};
use crate::backend::connection::ConnectionManager;
use crate::backend::source::{SerialPortOpener, SourceOpener, SourceReader};
use crate::config::ForwarderConfig;
use crate::error::{ForwarderError, Result};
use crate::types::{PipelineSnapshot, PipelineStats};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest single sleep inside a loop before the lifecycle flag is re-checked
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Timing knobs of the pipeline loops
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineTuning {
    /// Longest wait for channel space before a read record is dropped
    pub enqueue_timeout: Duration,
    /// Longest wait for a record; bounds how long the send loop goes without checking the flag
    pub dequeue_timeout: Duration,
    /// Pause after a serial open/read failure
    pub serial_retry_delay: Duration,
    /// Pause after an unexpected error
    pub error_pause: Duration,
    /// Per-loop wait in `stop()` before the loop is abandoned
    pub join_timeout: Duration,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            enqueue_timeout: Duration::from_secs(1),
            dequeue_timeout: Duration::from_secs(1),
            serial_retry_delay: Duration::from_secs(5),
            error_pause: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// State shared by a loop thread for one run
#[derive(Clone)]
struct LoopContext {
    running: Arc<AtomicBool>,
    channel: BoundedChannel,
    stats: Arc<PipelineStats>,
    tuning: PipelineTuning,
}

impl LoopContext {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleep up to `duration`, returning early once the run is stopped
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// A spawned loop thread and its exit notification
struct LoopHandle {
    name: &'static str,
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

impl LoopHandle {
    fn spawn<F>(name: &'static str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        // Dropping the sender on thread exit (normal or unwinding) wakes the joiner
        let (exit_tx, exited) = bounded::<()>(1);
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            let _exit = exit_tx;
            body();
        })?;
        Ok(Self {
            name,
            handle,
            exited,
        })
    }

    /// Join the thread if it exits within `timeout`; otherwise detach it.
    fn join_within(self, timeout: Duration) -> bool {
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    tracing::error!("{} thread terminated by a panic", self.name);
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "{} thread did not stop within {:?}; abandoning it",
                    self.name,
                    timeout
                );
                false
            }
        }
    }
}

struct ActiveRun {
    running: Arc<AtomicBool>,
    loops: Vec<LoopHandle>,
}

/// Serial-to-TCP forwarding pipeline.
///
/// `start` and `stop` take `&self`, so the pipeline can sit in an `Arc` and
/// be stopped from a signal-handling thread. `stop` must not be called from
/// inside a loop thread.
pub struct ForwardingPipeline {
    source: Arc<dyn SourceOpener>,
    connection: Arc<ConnectionManager>,
    channel: BoundedChannel,
    tuning: PipelineTuning,
    stats: Arc<PipelineStats>,
    run: Mutex<Option<ActiveRun>>,
}

impl ForwardingPipeline {
    /// Pipeline with a default-capacity channel and default tuning
    pub fn new(source: Arc<dyn SourceOpener>, connection: Arc<ConnectionManager>) -> Self {
        Self {
            source,
            connection,
            channel: BoundedChannel::default(),
            tuning: PipelineTuning::default(),
            stats: Arc::new(PipelineStats::default()),
            run: Mutex::new(None),
        }
    }

    /// Pipeline reading the configured serial port and sending to the configured endpoint
    pub fn from_config(config: &ForwarderConfig) -> Self {
        let source = SerialPortOpener::new(config.serial_settings());
        let connection = ConnectionManager::tcp(config.ip.clone(), config.port);
        Self::new(Arc::new(source), Arc::new(connection))
    }

    /// Use an existing channel, e.g. one left over from a previous pipeline
    pub fn with_channel(mut self, channel: BoundedChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_tuning(mut self, tuning: PipelineTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn channel(&self) -> &BoundedChannel {
        &self.channel
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn tuning(&self) -> &PipelineTuning {
        &self.tuning
    }

    pub fn stats(&self) -> PipelineSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    /// Spawn the read and send loops. Does nothing if already running.
    ///
    /// Fails only if a thread cannot be spawned, in which case nothing is
    /// left running.
    pub fn start(&self) -> Result<()> {
        let mut run = self.run.lock();
        if run.is_some() {
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        let ctx = LoopContext {
            running: running.clone(),
            channel: self.channel.clone(),
            stats: self.stats.clone(),
            tuning: self.tuning,
        };

        let reader = SourceReader::new(self.source.clone());
        let read_ctx = ctx.clone();
        let read_loop = LoopHandle::spawn("ais-reader", move || run_read_loop(reader, read_ctx))?;

        let connection = self.connection.clone();
        let send_loop = match LoopHandle::spawn("ais-sender", move || run_send_loop(connection, ctx)) {
            Ok(handle) => handle,
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                read_loop.join_within(self.tuning.join_timeout);
                return Err(e.into());
            }
        };

        *run = Some(ActiveRun {
            running,
            loops: vec![read_loop, send_loop],
        });
        tracing::info!(
            "AIS forwarding started: {} -> {}",
            self.source.describe(),
            self.connection.endpoint()
        );
        Ok(())
    }

    /// Stop both loops and release the serial port and socket.
    ///
    /// Idempotent. Each loop gets up to `join_timeout` to exit; one that
    /// does not is abandoned.
    pub fn stop(&self) {
        let mut run = self.run.lock();
        let Some(active) = run.take() else {
            return;
        };

        tracing::info!("Stopping AIS forwarding...");
        active.running.store(false, Ordering::SeqCst);

        for handle in active.loops {
            handle.join_within(self.tuning.join_timeout);
        }

        if !self.connection.close_within(self.tuning.join_timeout) {
            tracing::warn!(
                "Connection to {} still busy; it is closed when the abandoned send returns",
                self.connection.endpoint()
            );
        }
        tracing::info!("AIS forwarding stopped ({})", self.stats.snapshot());
    }
}

impl Drop for ForwardingPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_read_loop(mut reader: SourceReader, ctx: LoopContext) {
    tracing::debug!("Read loop started on {}", reader.describe());

    while ctx.is_running() {
        let step = panic::catch_unwind(AssertUnwindSafe(|| read_step(&mut reader, &ctx)));
        match step {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_serial_fault() => {
                tracing::error!("AIS serial read error: {}", e);
                ctx.stats.record_serial_fault();
                reader.close();
                ctx.pause(ctx.tuning.serial_retry_delay);
            }
            Ok(Err(e)) => {
                tracing::error!("Unexpected error in read loop: {}", e);
                ctx.pause(ctx.tuning.error_pause);
            }
            Err(payload) => {
                tracing::error!("Read loop iteration panicked: {}", panic_message(&*payload));
                ctx.stats.record_panic();
                reader.close();
                ctx.pause(ctx.tuning.error_pause);
            }
        }
    }

    reader.close();
    tracing::debug!("Read loop stopped");
}

fn read_step(reader: &mut SourceReader, ctx: &LoopContext) -> Result<()> {
    reader.ensure_open()?;

    let Some(record) = reader.read_one()? else {
        return Ok(());
    };
    ctx.stats.record_read();
    tracing::debug!("Received AIS data: {:?}", record);

    if let Err(Full(record)) = ctx.channel.push_timeout(record, ctx.tuning.enqueue_timeout) {
        ctx.stats.record_enqueue_drop();
        tracing::warn!(
            "{}, dropping AIS data ({} bytes)",
            ForwarderError::QueueFull { capacity: ctx.channel.capacity() },
            record.len()
        );
    }
    Ok(())
}

fn run_send_loop(connection: Arc<ConnectionManager>, ctx: LoopContext) {
    tracing::debug!("Send loop started for {}", connection.endpoint());

    while ctx.is_running() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| send_step(&connection, &ctx))) {
            tracing::error!("Send loop iteration panicked: {}", panic_message(&*payload));
            ctx.stats.record_panic();
            ctx.pause(ctx.tuning.error_pause);
        }
    }

    connection.close();
    tracing::debug!("Send loop stopped");
}

fn send_step(connection: &ConnectionManager, ctx: &LoopContext) {
    // An empty wait is the cue to re-check the lifecycle flag
    let Some(record) = ctx.channel.pop_timeout(ctx.tuning.dequeue_timeout) else {
        return;
    };

    if connection.send(record.as_bytes()) {
        ctx.stats.record_forwarded();
        tracing::debug!("Sent {} bytes to {}", record.len(), connection.endpoint());
        return;
    }

    match ctx.channel.try_push_front(record) {
        Ok(()) => {
            ctx.stats.record_retry();
            tracing::warn!("Failed to send data, re-queuing");
        }
        Err(Full(record)) => {
            ctx.stats.record_requeue_drop();
            tracing::warn!(
                "{}, dropping data on send failure ({} bytes)",
                ForwarderError::QueueFull { capacity: ctx.channel.capacity() },
                record.len()
            );
        }
    }

    ctx.pause(connection.retry_after().min(ctx.tuning.dequeue_timeout));
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
