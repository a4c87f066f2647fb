use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

use crate::{l2_normalize_in_place, EmbeddingConfig, EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;

// Global HTTP client with connection pooling
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(32)
        .build()
        .expect("Failed to build HTTP client")
});

#[derive(Clone, Copy)]
enum ApiProviderKind {
    Google,
    OpenAI,
    Custom,
}

fn api_provider_kind(cfg: &EmbeddingConfig) -> ApiProviderKind {
    let provider = cfg
        .api_provider
        .as_deref()
        .unwrap_or("custom")
        .to_ascii_lowercase();
    match provider.as_str() {
        "google" | "gemini" => ApiProviderKind::Google,
        "openai" | "gpt" => ApiProviderKind::OpenAI,
        _ => ApiProviderKind::Custom,
    }
}

fn build_api_payload(provider: ApiProviderKind, text: &str, cfg: &EmbeddingConfig) -> Value {
    match provider {
        ApiProviderKind::Google => json!({
            "model": cfg.model_name,
            "content": { "parts": [{ "text": text }] },
            "task_type": cfg.task_type,
        }),
        ApiProviderKind::OpenAI => json!({ "input": text, "model": cfg.model_name }),
        ApiProviderKind::Custom => json!({ "text": text }),
    }
}

/// HTTP client for an external embedding-generation service.
///
/// A single request per `embed` call; failures surface immediately and the
/// caller decides how to degrade.
pub struct ApiEmbedder {
    cfg: EmbeddingConfig,
    url: String,
}

impl ApiEmbedder {
    pub fn new(cfg: EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let url = cfg
            .api_url
            .clone()
            .ok_or_else(|| EmbeddingError::InvalidConfig("api_url is required".into()))?;
        if cfg.embedding_dim == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "embedding_dim must be non-zero".into(),
            ));
        }
        Ok(Self { cfg, url })
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.cfg
    }

    async fn send_request(&self, payload: Value) -> Result<Value, EmbeddingError> {
        let mut request = HTTP_CLIENT
            .post(&self.url)
            .timeout(self.cfg.timeout)
            .header("Content-Type", "application/json");
        if let Some(header) = self.cfg.api_auth_header.as_deref() {
            request = request.header("Authorization", header);
        }

        let response = request
            .json(&payload)
            .send()
            .await
            .map_err(|e| EmbeddingError::Http(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "embedding API request rejected");
            return Err(EmbeddingError::Http(format!("HTTP error {status}: {body}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| EmbeddingError::Upstream(format!("invalid JSON response: {e}")))
    }
}

#[async_trait]
impl EmbeddingProvider for ApiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let provider = api_provider_kind(&self.cfg);
        let payload = build_api_payload(provider, text, &self.cfg);

        let response = self.send_request(payload).await?;
        let mut vector = parse_embedding_response(response)?;

        if vector.len() != self.cfg.embedding_dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.cfg.embedding_dim,
                got: vector.len(),
            });
        }

        if self.cfg.normalize {
            l2_normalize_in_place(&mut vector);
        }

        Ok(vector)
    }

    fn dim(&self) -> usize {
        self.cfg.embedding_dim
    }
}

/// Extract a single embedding vector from the provider response.
///
/// Accepts the shapes seen in the wild:
/// `{"embedding": {"values": [..]}}`, `{"embedding": [..]}`,
/// `{"embeddings": [[..]]}`, `{"data": [{"embedding": [..]}]}`, and a bare
/// array.
fn parse_embedding_response(value: Value) -> Result<Vec<f32>, EmbeddingError> {
    match value {
        Value::Object(mut map) => {
            if let Some(embedding) = map.remove("embedding") {
                return match embedding {
                    Value::Object(mut inner) => match inner.remove("values") {
                        Some(values) => parse_embedding_vector(values),
                        None => Err(EmbeddingError::Upstream(
                            "missing `values` field in embedding object".into(),
                        )),
                    },
                    other => parse_embedding_vector(other),
                };
            }

            if let Some(embeddings) = map.remove("embeddings") {
                let mut vectors = parse_embedding_collection(embeddings)?;
                return vectors.pop().ok_or_else(|| {
                    EmbeddingError::Upstream("response contained no embeddings".into())
                });
            }

            if let Some(Value::Array(items)) = map.remove("data") {
                for item in items {
                    if let Value::Object(mut obj) = item {
                        if let Some(embedding) = obj.remove("embedding") {
                            return parse_embedding_vector(embedding);
                        }
                    }
                }
                return Err(EmbeddingError::Upstream(
                    "missing `embedding` field in data items".into(),
                ));
            }

            Err(EmbeddingError::Upstream(
                "unsupported API response shape".into(),
            ))
        }
        other => parse_embedding_vector(other),
    }
}

fn parse_embedding_collection(value: Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                Ok(Vec::new())
            } else if items.iter().all(|item| matches!(item, Value::Array(_))) {
                items.into_iter().map(parse_embedding_vector).collect()
            } else {
                parse_embedding_vector(Value::Array(items)).map(|vec| vec![vec])
            }
        }
        other => parse_embedding_vector(other).map(|vec| vec![vec]),
    }
}

fn parse_embedding_vector(value: Value) -> Result<Vec<f32>, EmbeddingError> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .map(|entry| match entry {
                Value::Number(num) => num
                    .as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| EmbeddingError::Upstream("non-finite embedding value".into())),
                other => Err(EmbeddingError::Upstream(format!(
                    "embedding entries must be numbers, got {other:?}"
                ))),
            })
            .collect(),
        other => Err(EmbeddingError::Upstream(format!(
            "embedding vector must be an array, got {other:?}"
        ))),
    }
}
