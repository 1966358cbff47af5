//! Backend module: serial input, buffering and TCP output
//!
//! Everything that runs on the worker threads lives here.
//!
//! # Components
//!
//! - [`SourceReader`] - Owns the serial handle and yields line records
//! - [`BoundedChannel`] - Fixed-capacity FIFO between the two loops
//! - [`ConnectionManager`] - The outbound TCP link and its reconnect backoff
//! - [`Backoff`] - Exponential delay between connection attempts
//! - [`ForwardingPipeline`] - Runs the read and send loops and owns their lifecycle
//! - [`MockSource`] - Scripted serial source for testing without hardware
//!
//! # Example
//!
//! ```ignore
//! use ais_forwarder::backend::{ConnectionManager, ForwardingPipeline, MockSource};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let source = MockSource::new(Duration::from_millis(100));
//! let feed = source.handle();
//! let connection = Arc::new(ConnectionManager::tcp("127.0.0.1", 10110));
//!
//! let pipeline = ForwardingPipeline::new(Arc::new(source), connection);
//! pipeline.start()?;
//! feed.push_line("!AIVDM,1,1,,A,13aEOK?P00PD2wVMdLDRhgvL289?,0*26\r\n");
//! ```

pub mod backoff;
pub mod channel;
pub mod connection;
pub mod mock_source;
pub mod pipeline;
pub mod source;

pub use backoff::{Backoff, BackoffPolicy};
pub use channel::{BoundedChannel, Full, DEFAULT_CAPACITY};
pub use connection::{Connector, ConnectionManager, TcpConnector, DEFAULT_IO_TIMEOUT};
pub use mock_source::{MockSource, MockSourceHandle};
pub use pipeline::{ForwardingPipeline, PipelineTuning};
pub use source::{SerialPortOpener, SerialSettings, SourceOpener, SourceReader, MAX_LINE_LEN};
