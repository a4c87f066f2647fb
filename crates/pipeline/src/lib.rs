//! # GIP Pipeline
//!
//! Turns one raw gestural message into a rule-gated mutation of a stored
//! semantic embedding, plus an audit entry:
//!
//! 1. extraction normalizes the message into an intent vector,
//! 2. [`ContextResolver`] embeds a query string and finds the nearest
//!    stored embedding,
//! 3. [`IntentApplier`] gates the intent against the embedding's declared
//!    affordances, applies `base + direction * intensity`, renormalizes,
//!    and persists,
//! 4. the [`Coordinator`] sequences the stages and hands exactly one
//!    capture job to the learning worker per invocation.
//!
//! Responses go back to the caller without waiting on the audit write.

mod applier;
mod coordinator;
mod resolver;

pub use applier::IntentApplier;
pub use coordinator::Coordinator;
pub use resolver::ContextResolver;

use embedding::EmbeddingProvider;
use learning::{ActionResult, LearningCapture, LearningLogStore};
use serde::Serialize;
use std::sync::Arc;
use store::{EmbeddingStore, StoreError};
use thiserror::Error;
use uuid::Uuid;

pub use intent::SemanticDirections;

/// Pipeline-level failures. Refusals and per-message business outcomes are
/// not errors; they travel in [`IntentOutcome`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("pipeline configuration error: {0}")]
    Config(String),
}

/// Configuration of the pipeline.
///
/// `embedding_dim` is the single source of truth for vector length; it is
/// validated against the store's dimension at construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Dimension of every embedding flowing through the pipeline.
    pub embedding_dim: usize,
    /// Key in the intent's target context holding the resolution query.
    pub context_key: String,
    /// Query used when the context key is absent.
    pub default_context_query: String,
    /// How many neighbors to consider during context resolution.
    pub search_limit: usize,
    /// Bound on unwritten audit entries.
    pub capture_queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 768,
            context_key: "currentDocumentName".to_string(),
            default_context_query: "general scene context".to_string(),
            search_limit: 1,
            capture_queue_depth: 256,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_context_key<S: Into<String>>(mut self, key: S) -> Self {
        self.context_key = key.into();
        self
    }

    pub fn with_default_context_query<S: Into<String>>(mut self, query: S) -> Self {
        self.default_context_query = query.into();
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn with_capture_queue_depth(mut self, depth: usize) -> Self {
        self.capture_queue_depth = depth;
        self
    }
}

/// Terminal result of processing one gesture message.
#[derive(Debug, Clone)]
pub struct IntentOutcome {
    pub status: ActionResult,
    pub message: String,
    pub modified_embedding_id: Option<Uuid>,
    /// Set on affordance refusals so the client can hint alternatives.
    pub available_gestures: Option<Vec<String>>,
    /// The embedding context resolution selected, if any.
    pub context_embedding_id: Option<Uuid>,
}

impl IntentOutcome {
    pub(crate) fn error<S: Into<String>>(message: S) -> Self {
        Self {
            status: ActionResult::Error,
            message: message.into(),
            modified_embedding_id: None,
            available_gestures: None,
            context_embedding_id: None,
        }
    }
}

/// Wire shape of the response returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct IntentResponse {
    pub status: ActionResult,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_embedding_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_gestures: Option<Vec<String>>,
}

impl From<IntentOutcome> for IntentResponse {
    fn from(outcome: IntentOutcome) -> Self {
        Self {
            status: outcome.status,
            message: outcome.message,
            modified_embedding_id: outcome.modified_embedding_id,
            available_gestures: outcome.available_gestures,
        }
    }
}

/// Fully wired pipeline: coordinator plus the capture worker it feeds.
pub struct GesturePipeline {
    coordinator: Coordinator,
    capture: Arc<LearningCapture>,
    store: Arc<EmbeddingStore>,
    learning_log: Arc<LearningLogStore>,
}

impl GesturePipeline {
    /// Wire the pipeline with the default direction registry for
    /// `cfg.embedding_dim`.
    pub fn new(
        cfg: PipelineConfig,
        store: Arc<EmbeddingStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        learning_log: Arc<LearningLogStore>,
    ) -> Result<Self, PipelineError> {
        let directions = Arc::new(SemanticDirections::defaults(cfg.embedding_dim));
        Self::with_directions(cfg, store, embedder, learning_log, directions)
    }

    /// Wire the pipeline with an explicit direction registry.
    pub fn with_directions(
        cfg: PipelineConfig,
        store: Arc<EmbeddingStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        learning_log: Arc<LearningLogStore>,
        directions: Arc<SemanticDirections>,
    ) -> Result<Self, PipelineError> {
        if store.embedding_dim() != cfg.embedding_dim {
            return Err(PipelineError::Config(format!(
                "store embedding_dim {} does not match pipeline embedding_dim {}",
                store.embedding_dim(),
                cfg.embedding_dim
            )));
        }
        if directions.dim() != cfg.embedding_dim {
            return Err(PipelineError::Config(format!(
                "direction registry dim {} does not match pipeline embedding_dim {}",
                directions.dim(),
                cfg.embedding_dim
            )));
        }

        let capture = Arc::new(LearningCapture::spawn(
            Arc::clone(&learning_log),
            cfg.capture_queue_depth,
        ));

        let resolver = ContextResolver::new(
            Arc::clone(&store),
            embedder,
            cfg.context_key.clone(),
            cfg.default_context_query.clone(),
            cfg.search_limit,
        );
        let applier = IntentApplier::new(Arc::clone(&store), directions, cfg.embedding_dim);
        let coordinator = Coordinator::new(resolver, applier, Arc::clone(&capture));

        Ok(Self {
            coordinator,
            capture,
            store,
            learning_log,
        })
    }

    /// Process one raw gesture message for `user_id`.
    pub async fn handle_intent(&self, user_id: &str, raw: &serde_json::Value) -> IntentResponse {
        self.coordinator.handle_intent(user_id, raw).await
    }

    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    pub fn learning_log(&self) -> &Arc<LearningLogStore> {
        &self.learning_log
    }

    /// The capture worker, exposed so callers can flush on shutdown.
    pub fn capture(&self) -> &Arc<LearningCapture> {
        &self.capture
    }
}
