//! Workspace umbrella crate for the Gesture Intent Pipeline (GIP).
//!
//! This crate stitches together intent extraction, context resolution,
//! embedding mutation, and learning capture so callers can process gestural
//! messages with a single API entry point.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = gip::wire_in_memory(gip::PipelineConfig::default().with_embedding_dim(8))?;
//!
//! let message = serde_json::json!({
//!     "intent": "select",
//!     "intensity": 0.8,
//!     "context": { "currentDocumentName": "scene.gltf" }
//! });
//! let response = pipeline.handle_intent("user-1", &message).await;
//! println!("{}", response.message);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub use embedding::{
    ApiEmbedder, EmbeddingConfig, EmbeddingError, EmbeddingProvider, StubEmbedder,
};
pub use intent::{
    extract, IntentVector, SemanticDirections, SemanticDirectionsBuilder, DEFAULT_INTENSITY,
    UNKNOWN_INTENT,
};
pub use learning::{
    ActionResult, CaptureJob, LearningCapture, LearningError, LearningLogEntry, LearningLogStore,
};
pub use pipeline::{
    GesturePipeline, IntentOutcome, IntentResponse, PipelineConfig, PipelineError,
};
pub use store::{
    BackendConfig, EmbeddingRecord, EmbeddingStore, InMemoryBackend, NeighborHit, StoreBackend,
    StoreConfig, StoreError,
};

/// Wire a fully in-memory pipeline with the deterministic stub embedder.
///
/// The store, learning log, and capture worker all share one in-memory
/// backend. Useful for tests, demos, and library consumers that do not want
/// persistence or an external embedding service.
pub fn wire_in_memory(cfg: PipelineConfig) -> Result<Arc<GesturePipeline>, PipelineError> {
    let store_cfg = StoreConfig::default()
        .with_backend(BackendConfig::in_memory())
        .with_embedding_dim(cfg.embedding_dim);
    let store = Arc::new(EmbeddingStore::open(store_cfg)?);
    let log = Arc::new(LearningLogStore::new(store.backend()));
    let embedder = Arc::new(StubEmbedder::new(cfg.embedding_dim));

    Ok(Arc::new(GesturePipeline::new(cfg, store, embedder, log)?))
}

/// Wire a pipeline over an already-open store and an arbitrary embedder.
///
/// The learning log shares the store's backend, so persistent deployments get
/// a durable audit trail in the same database file.
pub fn wire(
    cfg: PipelineConfig,
    store: Arc<EmbeddingStore>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<GesturePipeline>, PipelineError> {
    let log = Arc::new(LearningLogStore::new(store.backend()));
    Ok(Arc::new(GesturePipeline::new(cfg, store, embedder, log)?))
}
