//! plugwatch - smart-plug uptime and energy monitor

use plugwatch::config::ServerConfig;
use plugwatch::db::Store;
use plugwatch::scheduler::Scheduler;
use plugwatch::web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("plugwatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting plugwatch on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);
    tracing::info!(
        "Polling every {:?}, statistics every {:?}, timezone {}",
        cfg.poll_interval,
        cfg.stats_interval,
        cfg.timezone.name()
    );

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    if store.get_devices()?.is_empty() {
        tracing::warn!("No devices registered yet; add one with POST /api/devices");
    }

    // Start scheduler
    let scheduler = Arc::new(Scheduler::new(store.clone(), &cfg)?);
    scheduler.start().await?;

    // Start web server
    let server = Server::new(cfg, store, scheduler);
    server.start().await?;

    Ok(())
}
