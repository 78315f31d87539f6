//! Relay Jobs - Main Entry Point

mod logging;
mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

// Import workspace crates
use relay_api_rpc::RpcServer;
use relay_core::port::id_provider::UuidProvider;
use relay_core::{ErrorKind, JobsService};
use relay_infra_memory::{EphemeralConstructor, DRIVER_NAME};
use relay_infra_system::ProcessPoolFactory;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const RPC_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let _log_guard = logging::init()?;

    info!("Relay Jobs v{} starting...", VERSION);

    // 2. Load configuration
    let settings = settings::load()?;

    // 3. Setup dependencies (DI wiring)
    let mut jobs = match JobsService::new(settings.jobs, Arc::new(ProcessPoolFactory)) {
        Ok(jobs) => jobs,
        Err(e) if e.kind() == ErrorKind::Disabled => {
            warn!(error = %e, "No jobs section configured, nothing to serve");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    jobs.register_driver(DRIVER_NAME, Arc::new(EphemeralConstructor::new()));
    let jobs = Arc::new(jobs);

    // 4. Activate pipelines, worker pool and pollers
    if let Err(e) = jobs.serve().await {
        jobs.stop().await;
        return Err(e).context("Jobs service failed to start");
    }

    // 5. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_server = RpcServer::new(settings.rpc, Arc::clone(&jobs), Arc::new(UuidProvider));
    let (addr, rpc_handle) = match rpc_server.start().await {
        Ok(started) => started,
        Err(e) => {
            jobs.stop().await;
            return Err(anyhow::anyhow!("RPC server start failed: {}", e));
        }
    };

    info!(rpc = %addr, pipelines = jobs.list().len(), "System ready. Waiting for jobs...");
    info!("Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown: stop accepting calls, then drain the service
    relay_api_rpc::shutdown(rpc_handle, RPC_STOP_TIMEOUT).await;

    jobs.stop().await;

    info!("Shutdown complete.");

    Ok(())
}
