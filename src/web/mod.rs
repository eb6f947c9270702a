//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::scheduler::Scheduler;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub scheduler: Arc<Scheduler>,
}

/// Web server for plugwatch.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            state: AppState {
                config,
                store,
                scheduler,
            },
        }
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = routes(self.state.clone());

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

/// Build the router with all routes.
pub fn routes(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        .route("/healthz", get(handlers::handle_health))
        // Device registry
        .route(
            "/api/devices",
            get(handlers::handle_get_devices).post(handlers::handle_create_device),
        )
        .route(
            "/api/devices/{device_id}",
            put(handlers::handle_update_device).delete(handlers::handle_delete_device),
        )
        // Telemetry
        .route("/api/devices/{device_id}/samples", get(handlers::handle_get_samples))
        .route(
            "/api/devices/{device_id}/status/current",
            get(handlers::handle_current_status),
        )
        .route(
            "/api/devices/{device_id}/status/history",
            get(handlers::handle_status_history),
        )
        // Statistics
        .route(
            "/api/devices/{device_id}/statistics",
            get(handlers::handle_get_statistics),
        )
        .route(
            "/api/devices/{device_id}/statistics/refresh",
            post(handlers::handle_refresh_statistics),
        )
        .route(
            "/api/devices/{device_id}/statistics/status",
            get(handlers::handle_status_statistics),
        )
        .route(
            "/api/devices/{device_id}/statistics/energy",
            get(handlers::handle_energy_statistics),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
        .with_state(state)
}
