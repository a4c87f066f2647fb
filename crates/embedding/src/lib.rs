//! # GIP Embedding
//!
//! Client for the external embedding-generation collaborator. Given a query
//! string, a provider returns a fixed-dimension `f32` vector. Failures are
//! terminal for the one request; the pipeline maps them to "no context
//! found" rather than retrying.
//!
//! Two providers ship with the crate:
//!
//! - [`ApiEmbedder`]: HTTP client speaking google / openai / custom payload
//!   shapes with tolerant response parsing.
//! - [`StubEmbedder`]: deterministic hash-seeded vectors for tests and
//!   offline runs.

mod api;
mod error;
mod stub;

pub use api::ApiEmbedder;
pub use error::EmbeddingError;
pub use stub::StubEmbedder;

use async_trait::async_trait;
use std::time::Duration;

/// Default dimension matching the `text-embedding-004` family.
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Configuration for embedding generation.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Endpoint of the embedding-generation service. Required for api mode.
    pub api_url: Option<String>,
    /// Provider payload shape: `google`, `openai`, or anything else for the
    /// custom `{ "text": ... }` shape.
    pub api_provider: Option<String>,
    /// Optional value for the `Authorization` header, passed verbatim.
    pub api_auth_header: Option<String>,
    /// Model identifier forwarded to the provider.
    pub model_name: String,
    /// Task type hint (google providers only).
    pub task_type: String,
    /// Expected dimension of returned vectors; anything else is an error.
    pub embedding_dim: usize,
    /// Whether to L2-normalize vectors before returning them.
    pub normalize: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_provider: None,
            api_auth_header: None,
            model_name: "models/text-embedding-004".to_string(),
            task_type: "RETRIEVAL_QUERY".to_string(),
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            normalize: false,
            timeout: Duration::from_secs(30),
        }
    }
}

impl EmbeddingConfig {
    pub fn with_api_url<S: Into<String>>(mut self, url: S) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_api_provider<S: Into<String>>(mut self, provider: S) -> Self {
        self.api_provider = Some(provider.into());
        self
    }

    pub fn with_api_auth_header<S: Into<String>>(mut self, header: S) -> Self {
        self.api_auth_header = Some(header.into());
        self
    }

    pub fn with_model_name<S: Into<String>>(mut self, model: S) -> Self {
        self.model_name = model.into();
        self
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Object-safe embedding generation interface.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Produce the embedding vector for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Dimension every vector from this provider has.
    fn dim(&self) -> usize;
}

/// In-place L2 normalization, shared by both providers.
pub(crate) fn l2_normalize_in_place(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 {
        let inv_norm = norm_sq.sqrt().recip();
        for x in v.iter_mut() {
            *x *= inv_norm;
        }
    }
}
