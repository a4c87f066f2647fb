use thiserror::Error;

/// Errors from embedding generation.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("invalid embedding configuration: {0}")]
    InvalidConfig(String),

    #[error("embedding request failed: {0}")]
    Http(String),

    #[error("embedding service returned an unusable response: {0}")]
    Upstream(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
