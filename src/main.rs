//! keyrec-daemon: background daemon for keyword-triggered recording
//!
//! This daemon provides:
//! - Keyword listening with a trained trigger phrase
//! - Bounded auto recordings on detection, plus manual recordings
//! - IPC server for control and state notifications

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use keyrec_daemon::backend::StandIns;
use keyrec_daemon::config::Config;
use keyrec_daemon::ipc::Server;
use keyrec_daemon::lifecycle::ShutdownSignal;
use keyrec_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "keyrec-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        socket = %config.socket_path.display(),
        data_dir = %config.data_dir.display(),
        auto_record_secs = config.orchestrator.auto_record_duration.as_secs(),
        "configuration loaded"
    );

    // Create shutdown signal handler
    let mut shutdown = ShutdownSignal::new()?;

    // Wire the orchestrator to its collaborators
    let stand_ins = StandIns::new(&config);
    let (handle, mut orchestrator) =
        Orchestrator::spawn(config.orchestrator.clone(), stand_ins.collaborators);

    // Create IPC server
    let server = Server::new(&config.socket_path, handle.clone(), stand_ins.bridge)?;

    info!("daemon initialized, entering main loop");

    let orchestrator_running = tokio::select! {
        result = &mut orchestrator => {
            if let Err(e) = result {
                error!(?e, "orchestrator task failed");
            }
            false
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
            true
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
            true
        }
    };

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;
    if orchestrator_running {
        handle.shutdown().await;
        if let Err(e) = orchestrator.await {
            error!(?e, "orchestrator task failed during shutdown");
        }
    }

    info!("keyrec-daemon stopped");

    Ok(())
}
