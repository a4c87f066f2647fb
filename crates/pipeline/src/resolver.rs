use embedding::EmbeddingProvider;
use intent::IntentVector;
use std::sync::Arc;
use store::{EmbeddingRecord, EmbeddingStore};
use tracing::{debug, warn};

use crate::PipelineError;

/// Finds the stored embedding closest to the intent's context.
///
/// The query string comes from the intent's target context under the
/// configured key, falling back to a fixed default. A failed embedding call
/// degrades to "no context" rather than an error; only storage failures
/// propagate.
pub struct ContextResolver {
    store: Arc<EmbeddingStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    context_key: String,
    default_query: String,
    search_limit: usize,
}

impl ContextResolver {
    pub fn new(
        store: Arc<EmbeddingStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        context_key: String,
        default_query: String,
        search_limit: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            context_key,
            default_query,
            search_limit: search_limit.max(1),
        }
    }

    /// The query string the resolver would embed for this intent.
    pub fn query_for(&self, intent: &IntentVector) -> String {
        intent
            .target_context
            .get(&self.context_key)
            .and_then(|v| v.as_str())
            .unwrap_or(&self.default_query)
            .to_string()
    }

    /// Resolve the nearest embedding for this intent, or `None` when the
    /// store is empty or the embedding call fails.
    pub async fn resolve(
        &self,
        intent: &IntentVector,
    ) -> Result<Option<EmbeddingRecord>, PipelineError> {
        let query = self.query_for(intent);

        let vector = match self.embedder.embed(&query).await {
            Ok(v) => v,
            Err(e) => {
                warn!("embedding generation failed for context query '{query}': {e}");
                return Ok(None);
            }
        };

        let hits = self.store.nearest(&vector, self.search_limit)?;
        let Some(hit) = hits.first() else {
            debug!("no neighbor found for context query '{query}'");
            return Ok(None);
        };

        Ok(self.store.get(&hit.id)?)
    }
}
