//! Builders for pipelines wired to test doubles

use ais_forwarder::backend::{
    BackoffPolicy, BoundedChannel, ConnectionManager, Connector, ForwardingPipeline, MockSource,
    MockSourceHandle, PipelineTuning, DEFAULT_IO_TIMEOUT,
};
use std::sync::Arc;
use std::time::Duration;

/// Tuning with short waits so tests finish quickly
pub fn fast_tuning() -> PipelineTuning {
    PipelineTuning {
        enqueue_timeout: Duration::from_millis(5),
        dequeue_timeout: Duration::from_millis(20),
        serial_retry_delay: Duration::from_millis(20),
        error_pause: Duration::from_millis(10),
        join_timeout: Duration::from_secs(2),
    }
}

/// Backoff measured in milliseconds instead of seconds
pub fn fast_policy() -> BackoffPolicy {
    BackoffPolicy {
        base: Duration::from_millis(10),
        factor: 1.5,
        max: Duration::from_millis(80),
    }
}

/// Builder for a pipeline reading from a [`MockSource`]
pub struct PipelineBuilder {
    read_timeout: Duration,
    channel: Option<BoundedChannel>,
    tuning: PipelineTuning,
    policy: BackoffPolicy,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            read_timeout: Duration::from_millis(20),
            channel: None,
            tuning: fast_tuning(),
            policy: fast_policy(),
        }
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn channel(mut self, channel: BoundedChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn tuning(mut self, tuning: PipelineTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Build against `connector`, returning the pipeline and the serial feed
    pub fn build(self, connector: impl Connector + 'static) -> (ForwardingPipeline, MockSourceHandle) {
        let source = MockSource::new(self.read_timeout);
        let feed = source.handle();
        let connection = ConnectionManager::with_policy(connector, self.policy, DEFAULT_IO_TIMEOUT);

        let mut pipeline =
            ForwardingPipeline::new(Arc::new(source), Arc::new(connection)).with_tuning(self.tuning);
        if let Some(channel) = self.channel {
            pipeline = pipeline.with_channel(channel);
        }
        (pipeline, feed)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
