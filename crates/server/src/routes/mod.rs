//! API route handlers
//!
//! This module contains all HTTP endpoint implementations for the gesture
//! intent server. Routes are organized by functionality:
//!
//! - `health`: Health checks, readiness, metrics, and server metadata
//! - `intent`: Gesture intent resolution (WebSocket stream and HTTP)
//! - `embeddings`: Context embedding management (insert, fetch, search, delete)
//! - `learning`: Learning log reads

pub mod embeddings;
pub mod health;
pub mod intent;
pub mod learning;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// API version and base info
///
/// Returns server information including version and available endpoints.
/// This is the root endpoint (GET /) and requires no authentication.
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "Gesture Intent Server",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "endpoints": [
            "/ws/v1/gesture-intent",
            "/api/v1/intent",
            "/api/v1/embeddings",
            "/api/v1/embeddings/{id}",
            "/api/v1/learning-log",
            "/api/v1/metadata",
            "/health",
            "/ready",
            "/metrics"
        ]
    })))
}

/// 404 Not Found handler
///
/// Returns a standardized error response for undefined routes.
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
