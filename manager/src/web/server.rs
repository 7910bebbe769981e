// File: manager/src/web/server.rs
use crate::web::{handlers, AppState};
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Serves the API until `shutdown` resolves.
pub async fn start_web_server<F>(state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Web server stopped");
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // === SERVICE ROUTES ===
        .route("/api/services", get(handlers::list_services))
        .route("/api/services/{service_id}/health", get(handlers::get_service_health))
        .route(
            "/api/services/{service_id}/health/check",
            post(handlers::check_service_health),
        )
        .route("/api/services/{service_id}/restart", post(handlers::restart_service))
        // === MARKET ROUTES ===
        .route("/api/market/install", post(handlers::install_package))
        .route("/api/market/uninstall", post(handlers::uninstall_package))
        .route(
            "/api/market/installation_status/{service_id}",
            get(handlers::get_installation_status),
        )
        .route(
            "/api/market/installation/{service_id}/cancel",
            post(handlers::cancel_installation),
        )
        .route("/api/market/tasks", get(handlers::list_active_tasks))
        // === CACHE ROUTES ===
        .route("/api/cache/stats", get(handlers::get_cache_stats))
        // Add middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
