//! Arca backup lifecycle daemon.
//!
//! Loads configuration, re-arms persisted schedules, and runs the scheduler
//! and monitor until SIGINT/SIGTERM.

use std::sync::Arc;

use arca_core::ArcaConfig;
use arca_engine::{LogNotifier, MemoryBackupGateway, Monitor, Scheduler, SystemDiskProbe};
use arca_store::FileScheduleStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "daemon terminated with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ArcaConfig::load()?;
    tracing::info!(data_dir = %config.store.data_dir.display(), "configuration loaded");

    let store = Arc::new(FileScheduleStore::open(&config.store.data_dir).await?);
    // Stand-in gateway until a datastore-specific one is linked in.
    let gateway = Arc::new(MemoryBackupGateway::new());
    tracing::warn!("using in-memory backup gateway; artifacts are not durable");

    let disk = Arc::new(SystemDiskProbe::new(&config.store.data_dir));
    let scheduler = Scheduler::new(
        config.scheduler.clone(),
        store.clone(),
        gateway.clone(),
        Arc::new(LogNotifier),
    );
    let monitor = Monitor::new(config.monitor.clone(), store, gateway, disk);

    scheduler.start().await?;
    monitor.start().await?;

    wait_for_shutdown().await;
    tracing::info!("shutdown signal received");
    monitor.shutdown();
    scheduler.shutdown();
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::error!(error = %err, "could not install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
