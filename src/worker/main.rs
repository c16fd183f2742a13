/**
 * Task Sync Worker Entry Point
 *
 * Runs the background context as a standalone process: installs and
 * activates the cache, then drains the mutation queue on triggers until
 * interrupted.
 */
use taskapp_sync::local_db::LocalDatabase;
use taskapp_sync::network::HttpTransport;
use taskapp_sync::notifier::notifier_pair;
use taskapp_sync::shared::SyncConfig;
use taskapp_sync::sync::{DrainTrigger, NetworkMonitor};
use taskapp_sync::worker::SyncWorker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = SyncConfig::from_env()?;
    tracing::info!(
        "[Worker] Starting against {} with store {}",
        config.server_url,
        config.database_path.display()
    );

    let db = LocalDatabase::from_config(&config).await?;
    let transport = HttpTransport::from_config(&config)?;
    let (foreground, endpoint) = notifier_pair();
    let (inbox, broadcaster) = endpoint.into_parts();

    let worker = SyncWorker::new(config, db, transport, broadcaster, NetworkMonitor::default())?;

    if let Err(e) = worker.install().await {
        // Keep running: the queue still drains, pages are cached as they are fetched
        tracing::warn!("[Worker] Install failed: {}", e);
    }
    let evicted = worker.activate().await?;
    if !evicted.is_empty() {
        tracing::info!("[Worker] Removed {} stale caches", evicted.len());
    }

    // Whatever was queued while the worker was not running
    if let Err(e) = worker.engine().drain(DrainTrigger::Requested).await {
        tracing::error!("[Worker] Startup sync failed: {}", e);
    }

    let service = worker.start(inbox);

    tokio::signal::ctrl_c().await?;
    tracing::info!("[Worker] Shutting down");

    service.shutdown().await;
    drop(foreground);
    worker.engine().db().close().await;

    Ok(())
}
