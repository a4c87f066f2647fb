use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

/// Health check endpoint (liveness)
/// Returns 200 if server is running
pub async fn health_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "gip-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_secs(),
    }))
}

/// Readiness check endpoint
/// Returns 200 if server is ready to accept requests
pub async fn readiness_check(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    let store_len = state.pipeline.store().len();

    Ok(Json(json!({
        "status": "ready",
        "service": "gip-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_secs(),
        "components": {
            "api": "ready",
            "store": "ready",
            "embedder": "ready",
        },
        "stored_embeddings": store_len,
    })))
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    match &state.metrics_handle {
        Some(handle) => Ok(handle.render().into_response()),
        None => Ok(Json(json!({
            "uptime_seconds": state.uptime_secs(),
        }))
        .into_response()),
    }
}

/// Server metadata endpoint (authenticated)
pub async fn server_metadata(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.uptime_secs(),
        "embedding_dim": state.config.embedding_dim,
        "embedding_provider": if state.config.embedding_api_url.is_some() { "api" } else { "stub" },
        "store_backend": if state.config.store_path.is_some() { "redb" } else { "memory" },
        "stored_embeddings": state.pipeline.store().len(),
    })))
}
