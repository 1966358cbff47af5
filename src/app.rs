//! Service runner
//!
//! Starts the forwarding pipeline, parks the main thread until SIGINT or
//! SIGTERM arrives, then stops the pipeline and reports what was forwarded.

use crate::backend::ForwardingPipeline;
use crate::config::ForwarderConfig;
use anyhow::Context;
use std::sync::Arc;

/// Run the forwarder until a termination signal is received
pub fn run(config: &ForwarderConfig) -> anyhow::Result<()> {
    tracing::info!(
        "Starting AIS forwarder: {} @ {} baud -> {}",
        config.serial_port,
        config.baud_rate,
        config.endpoint()
    );

    let pipeline = Arc::new(ForwardingPipeline::from_config(config));
    pipeline.start().context("Failed to start forwarding pipeline")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;
    let signal = runtime.block_on(wait_for_shutdown());

    match signal {
        Ok(name) => tracing::info!("Received {}, shutting down", name),
        Err(e) => tracing::error!("Signal handling failed, shutting down: {:#}", e),
    }

    pipeline.stop();
    let stats = pipeline.stats();
    tracing::info!(
        "AIS forwarder stopped: {} read, {} forwarded, {} dropped, {} left in queue",
        stats.records_read,
        stats.records_forwarded,
        stats.dropped(),
        pipeline.channel().len()
    );
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> anyhow::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for SIGINT")?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> anyhow::Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    Ok("Ctrl-C")
}
