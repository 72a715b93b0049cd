//! HTTP request handlers for the web server.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::AppState;
use crate::harvest::TriggerOutcome;

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Start a harvest run in the background.
pub async fn trigger_harvest(State(state): State<AppState>) -> Response {
    let outcome = state.supervisor.trigger();
    let status = match outcome {
        TriggerOutcome::Started => StatusCode::ACCEPTED,
        TriggerOutcome::AlreadyRunning => StatusCode::OK,
    };
    (status, Json(json!({ "status": outcome }))).into_response()
}

/// Current run state and the last run's summary.
pub async fn harvest_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.supervisor.state())
}

/// Channel directory: handle, url, followers, last scraped, post count.
pub async fn list_channels(State(state): State<AppState>) -> Response {
    match state.store.list_channels().await {
        Ok(channels) => Json(channels).into_response(),
        Err(e) => {
            tracing::error!("Failed to list channels: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
