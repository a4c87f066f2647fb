//! Gesture Intent Server - HTTP and WebSocket API for gesture intent resolution
//!
//! This crate provides a production-ready server that exposes the gesture
//! intent pipeline over HTTP and WebSocket. It supports:
//!
//! - **Gesture Intents**: Streamed gesture messages over WebSocket, plus a
//!   one-shot HTTP endpoint
//! - **Context Embeddings**: Insert, fetch, search, and delete stored context
//!   embeddings
//! - **Learning Log**: Read the audit trail of processed intents
//! - **Health & Metrics**: Liveness/readiness probes and Prometheus-compatible
//!   metrics
//!
//! # Features
//!
//! - **Authentication**: API key-based authentication with rate limiting
//! - **Middleware**: Compression, CORS, request ID tracking, structured logging
//! - **Configuration**: Environment variable and file-based configuration
//! - **Error Handling**: Comprehensive error responses with error codes
//! - **Graceful Shutdown**: Proper signal handling; the learning capture queue
//!   is flushed before exit
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! ## Public Endpoints (No Authentication)
//!
//! - `GET /` - API information
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics
//!
//! ## Protected Endpoints (API Key Required)
//!
//! - `GET /ws/v1/gesture-intent` - WebSocket gesture intent stream
//! - `POST /api/v1/intent` - Process a single gesture message
//! - `POST /api/v1/embeddings` - Insert a context embedding
//! - `GET /api/v1/embeddings?query=...` - Nearest-neighbor search
//! - `GET /api/v1/embeddings/{id}` - Fetch embedding by ID
//! - `DELETE /api/v1/embeddings/{id}` - Delete embedding
//! - `GET /api/v1/learning-log` - Read audit entries
//! - `GET /api/v1/metadata` - Server metadata

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::start_server;
pub use state::ServerState;
