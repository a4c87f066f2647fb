use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

use embedding::{ApiEmbedder, EmbeddingConfig, EmbeddingProvider, StubEmbedder};
use learning::LearningLogStore;
use pipeline::{GesturePipeline, PipelineConfig};
use store::{BackendConfig, EmbeddingStore, StoreConfig};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,
    /// Rate limiter: client id -> (request count, window start)
    pub rate_limiter: Arc<DashMap<String, (u32, Instant)>>,
    pub pipeline: Arc<GesturePipeline>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub metrics_handle: Option<PrometheusHandle>,
    pub start_time: Instant,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let backend = match &config.store_path {
            Some(path) => {
                info!(path = %path, "opening persistent embedding store");
                BackendConfig::redb(path)
            }
            None => {
                info!("no store path configured, using in-memory embedding store");
                BackendConfig::in_memory()
            }
        };

        let store_cfg = StoreConfig::default()
            .with_backend(backend)
            .with_embedding_dim(config.embedding_dim);

        let embedder: Arc<dyn EmbeddingProvider> = match &config.embedding_api_url {
            Some(url) => {
                let mut emb_cfg = EmbeddingConfig::default()
                    .with_api_url(url.clone())
                    .with_model_name(config.embedding_model.clone())
                    .with_embedding_dim(config.embedding_dim);
                if let Some(provider) = &config.embedding_api_provider {
                    emb_cfg = emb_cfg.with_api_provider(provider.clone());
                }
                if let Some(header) = &config.embedding_api_auth_header {
                    emb_cfg = emb_cfg.with_api_auth_header(header.clone());
                }
                Arc::new(ApiEmbedder::new(emb_cfg)?)
            }
            None => {
                warn!("no embedding API configured, falling back to deterministic stub embedder");
                Arc::new(StubEmbedder::new(config.embedding_dim))
            }
        };

        let embedding_store = Arc::new(EmbeddingStore::open(store_cfg)?);
        let learning_log = Arc::new(LearningLogStore::new(embedding_store.backend()));

        let pipeline_cfg = PipelineConfig::default()
            .with_embedding_dim(config.embedding_dim)
            .with_capture_queue_depth(config.capture_queue_depth);

        let pipeline = GesturePipeline::new(
            pipeline_cfg,
            Arc::clone(&embedding_store),
            Arc::clone(&embedder),
            learning_log,
        )
        .map_err(|e| ServerError::Config(e.to_string()))?;

        let metrics_handle = if config.metrics_enabled {
            match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "failed to install metrics recorder");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            rate_limiter: Arc::new(DashMap::new()),
            pipeline: Arc::new(pipeline),
            embedder,
            metrics_handle,
            start_time: Instant::now(),
        })
    }

    /// Check if API key is valid
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.config.api_keys.contains(key)
    }

    /// Check rate limit for a client, returns true if allowed
    pub fn check_rate_limit(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let window = std::time::Duration::from_secs(60);
        let limit = self.config.rate_limit_per_minute;

        let mut entry = self
            .rate_limiter
            .entry(client_id.to_string())
            .or_insert((0, now));
        let (count, window_start) = *entry;

        if now.duration_since(window_start) > window {
            *entry = (1, now);
            true
        } else if count < limit {
            *entry = (count + 1, window_start);
            true
        } else {
            false
        }
    }

    /// Server uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> ServerState {
        let mut config = ServerConfig::default();
        config.metrics_enabled = false;
        config.api_keys.insert("demo-key-12345".to_string());
        ServerState::new(config).unwrap()
    }

    #[tokio::test]
    async fn api_key_validation() {
        let state = test_state();
        assert!(state.is_valid_api_key("demo-key-12345"));
        assert!(!state.is_valid_api_key("bogus"));
    }

    #[tokio::test]
    async fn rate_limit_window() {
        let state = test_state();
        for _ in 0..state.config.rate_limit_per_minute {
            assert!(state.check_rate_limit("client-a"));
        }
        assert!(!state.check_rate_limit("client-a"));
        assert!(state.check_rate_limit("client-b"));
    }
}
