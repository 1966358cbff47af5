//! # AIS Forwarder
//!
//! Reads newline-delimited AIS sentences from a serial receiver and forwards
//! them, byte for byte, to a single TCP endpoint.
//!
//! ## Architecture
//!
//! - **Read loop**: owns the serial port, splits the stream into line records
//!   and pushes them into a bounded in-memory channel
//! - **Send loop**: drains the channel into one TCP connection that is
//!   re-established with exponential backoff
//! - **Communication**: a bounded FIFO sits between the loops and absorbs
//!   network outages; when it is full, new records are dropped
//!
//! Both loops run on their own named threads and share nothing except the
//! channel, a stats block and a per-run stop flag.
//!
//! ## Configuration
//!
//! Settings come from a TOML file with an `[AIS]` table; see [`config`].
//!
//! ## Example
//!
//! ```ignore
//! use ais_forwarder::{config::ForwarderConfig, ForwardingPipeline};
//!
//! let config = ForwarderConfig::load("/etc/ais-forwarder/ais_config.toml")?;
//! let pipeline = ForwardingPipeline::from_config(&config);
//! pipeline.start()?;
//! // ... until shutdown
//! pipeline.stop();
//! ```

pub mod app;
pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use backend::{BoundedChannel, ConnectionManager, ForwardingPipeline, PipelineTuning};
pub use config::ForwarderConfig;
pub use error::{ForwarderError, Result};
pub use types::{ConnectionState, PipelineSnapshot, Record};
