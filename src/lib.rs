//! VLSM Deploy - credential vault and remote DHCP configuration deployment
//!
//! Stores the DHCP server login encrypted at rest and pushes rendered
//! configuration blocks to the server over SSH.

pub mod bridge;
pub mod commands;
pub mod config;
pub mod deploy;
pub mod ssh;

use std::process::ExitCode;

use commands::config::AppContext;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging
///
/// Logs go to stderr; stdout belongs to the bridge protocol.
fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Entry point for the `vlsm-deploy` binary
pub fn run() -> ExitCode {
    init_logging();

    tracing::info!("Starting VLSM Deploy...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let state = match AppContext::new().await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("Failed to initialize application context: {}", e);
                return ExitCode::FAILURE;
            }
        };

        tracing::info!("Vault status: {:?}", state.vault_status());

        match bridge::serve_stdio(&state).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("Bridge I/O error: {}", e);
                ExitCode::FAILURE
            }
        }
    })
}
