//! Router configuration for the web server.

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Run control
        .route(
            "/api/harvest",
            get(handlers::harvest_state).post(handlers::trigger_harvest),
        )
        // Channel directory for UI population
        .route("/api/channels", get(handlers::list_channels))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
