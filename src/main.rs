//! AIS Forwarder - Main Entry Point
//!
//! Usage: `ais-forwarder [CONFIG_PATH]`
//!
//! Reads AIS sentences from a serial receiver and forwards them to a TCP
//! endpoint until SIGINT or SIGTERM.

use ais_forwarder::{app, config::ForwarderConfig, config::DEFAULT_CONFIG_PATH, logging};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    // Config errors are reported before the configured subscriber exists
    let config = {
        let stderr = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .finish();
        let _scope = tracing::subscriber::set_default(stderr);

        match ForwarderConfig::load(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load configuration from {}: {}", config_path.display(), e);
                return ExitCode::FAILURE;
            }
        }
    };

    let _log_guard = match logging::init(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Loaded configuration from {}", config_path.display());

    match app::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("AIS forwarder failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
