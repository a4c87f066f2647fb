use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds (HTTP routes only; the gesture channel is
    /// long-lived)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Rate limit: requests per minute per API key
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// API keys for authentication (in production, use a database)
    #[serde(default)]
    pub api_keys: HashSet<String>,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metrics endpoint enabled
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Embedding dimension for the whole pipeline; validated against the
    /// store at startup
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Path to the redb database file; in-memory storage when absent
    #[serde(default)]
    pub store_path: Option<String>,

    /// Endpoint of the external embedding-generation service; a
    /// deterministic stub is used when absent
    #[serde(default)]
    pub embedding_api_url: Option<String>,

    /// Embedding provider payload shape: google, openai, or custom
    #[serde(default)]
    pub embedding_api_provider: Option<String>,

    /// Authorization header value for the embedding service
    #[serde(default)]
    pub embedding_api_auth_header: Option<String>,

    /// Embedding model identifier
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Bound on unwritten audit entries in the capture queue
    #[serde(default = "default_capture_queue_depth")]
    pub capture_queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            api_keys: HashSet::new(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
            embedding_dim: default_embedding_dim(),
            store_path: None,
            embedding_api_url: None,
            embedding_api_provider: None,
            embedding_api_auth_header: None,
            embedding_model: default_embedding_model(),
            capture_queue_depth: default_capture_queue_depth(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and config files
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("server").required(false))
            // Override with environment variables
            .add_source(config::Environment::with_prefix("GIP_SERVER").separator("__"));

        let config: ServerConfig = builder.build()?.try_deserialize()?;

        // Add demo API key if none configured (for development)
        let mut config = config;
        if config.api_keys.is_empty() {
            tracing::warn!("No API keys configured, using demo key 'demo-key-12345'");
            config.api_keys.insert("demo-key-12345".to_string());
        }

        Ok(config)
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_rate_limit_per_minute() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_embedding_dim() -> usize {
    768
}

fn default_embedding_model() -> String {
    "models/text-embedding-004".to_string()
}

fn default_capture_queue_depth() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.max_body_size_mb, 10);
        assert_eq!(cfg.rate_limit_per_minute, 100);
        assert!(cfg.enable_cors);
        assert!(cfg.metrics_enabled);
        assert_eq!(cfg.embedding_dim, 768);
        assert!(cfg.store_path.is_none());
        assert!(cfg.embedding_api_url.is_none());
        assert_eq!(cfg.capture_queue_depth, 256);
    }

    #[test]
    fn test_socket_addr() {
        let cfg = ServerConfig::default();
        let addr = cfg.socket_addr().unwrap();
        assert_eq!(addr.port(), 8080);
    }
}
