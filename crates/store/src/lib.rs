//! # GIP Store
//!
//! Backend-agnostic persistence for gesture-context embeddings. Each record
//! pairs a fixed-dimension vector with free-form JSON metadata (including the
//! gesture affordance list that gates mutations) and is addressed by UUID.
//!
//! ## Core Features
//!
//! - **Pluggable Backends**: storage goes through the [`StoreBackend`] trait.
//!   Out of the box there is an in-memory backend for tests and a redb
//!   backend for persistent, on-disk storage (enabled via the `backend-redb`
//!   feature).
//! - **Nearest-neighbor search**: [`EmbeddingStore::nearest`] finds the
//!   closest stored vectors by L2 distance, backed by a side index that
//!   switches from linear scan to HNSW as the dataset grows (see [`ann`]).
//! - **Compact records**: records are bincode-encoded and Zstd-compressed
//!   before hitting the backend.
//!
//! The backend keyspace is shared with the learning log: embeddings live
//! under `emb/`, the dimension marker under `schema/`, and audit entries
//! under `log/` (written by the learning crate).

pub mod ann;
mod backend;

use crate::ann::{AnnConfig, AnnError, AnnIndex};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

mod metadata_serde {
    use serde::de::Error as DeError;
    use serde::ser::Error as SerError;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub(super) fn serialize<S>(value: &Value, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes = serde_json::to_vec(value).map_err(SerError::custom)?;
        serializer.serialize_bytes(&bytes)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        serde_json::from_slice(&bytes).map_err(DeError::custom)
    }
}

#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use backend::{BackendConfig, InMemoryBackend, StoreBackend};

use bincode::config::standard;
use bincode::error::{DecodeError, EncodeError};
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use zstd::{decode_all, encode_all};

/// Bump this value whenever the on-disk `EmbeddingRecord` layout changes.
pub const STORE_SCHEMA_VERSION: u16 = 1;

/// Key prefix for embedding records.
pub const EMBEDDING_KEY_PREFIX: &str = "emb/";

/// Key prefix reserved for learning-log entries (written by the learning
/// crate through the same backend).
pub const LOG_KEY_PREFIX: &str = "log/";

/// Key holding the embedding dimension the store was created with.
const SCHEMA_DIM_KEY: &str = "schema/dim";

/// A stored gesture-context embedding.
///
/// The metadata JSON carries everything the pipeline does not interpret
/// structurally, plus the `gesture_affordances` array that gates which
/// intent types may mutate this record.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EmbeddingRecord {
    /// Schema version for backward compatibility when deserializing.
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    /// Identifier of the embedding.
    pub id: Uuid,
    /// The embedding vector itself.
    pub vector: Vec<f32>,
    /// Optional source text the vector was generated from.
    pub content: Option<String>,
    /// Arbitrary metadata associated with the embedding (JSON).
    #[serde(with = "metadata_serde")]
    pub metadata: serde_json::Value,
}

const fn default_schema_version() -> u16 {
    STORE_SCHEMA_VERSION
}

impl EmbeddingRecord {
    /// Create a record with a fresh UUID.
    pub fn new(vector: Vec<f32>, content: Option<String>, metadata: serde_json::Value) -> Self {
        Self {
            schema_version: STORE_SCHEMA_VERSION,
            id: Uuid::new_v4(),
            vector,
            content,
            metadata,
        }
    }

    /// The gesture types allowed to act on this embedding.
    ///
    /// Missing or malformed `gesture_affordances` metadata yields an empty
    /// list, which means every intent is refused for this record.
    pub fn gesture_affordances(&self) -> Vec<String> {
        match self.metadata.get("gesture_affordances") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Compression codec options for stored records.
#[derive(Clone, Debug, Default)]
pub enum CompressionCodec {
    /// No compression (useful for debugging).
    None,
    /// Zstd compression (default).
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug)]
pub struct CompressionConfig {
    /// The compression codec to use (None or Zstd).
    pub codec: CompressionCodec,
    /// Compression level (1-22 for Zstd, where higher = better compression but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(decode_all(data)?),
        }
    }
}

/// Config for initializing the store.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Backend storage configuration (in-memory or redb).
    pub backend: BackendConfig,
    /// Dimension every stored vector must have.
    pub embedding_dim: usize,
    /// Compression settings for stored records.
    pub compression: CompressionConfig,
    /// ANN configuration for nearest-neighbor search.
    pub ann: AnnConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            embedding_dim: 768,
            compression: CompressionConfig::default(),
            ann: AnnConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_ann(mut self, ann: AnnConfig) -> Self {
        self.ann = ann;
        self
    }
}

/// Custom error type
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Serialization encode error: {0}")]
    Encode(String),
    #[error("Serialization decode error: {0}")]
    Decode(String),
    #[error("Compression error: {0}")]
    Zstd(String),
    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Store was created with embedding_dim {found}, configured for {expected}")]
    SchemaMismatch { expected: usize, found: usize },
}

impl From<EncodeError> for StoreError {
    fn from(e: EncodeError) -> Self {
        StoreError::Encode(e.to_string())
    }
}

impl From<DecodeError> for StoreError {
    fn from(e: DecodeError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Zstd(e.to_string())
    }
}

impl From<AnnError> for StoreError {
    fn from(e: AnnError) -> Self {
        match e {
            AnnError::DimensionMismatch { expected, got } => {
                StoreError::DimensionMismatch { expected, got }
            }
            AnnError::NotBuilt => StoreError::Backend("ANN index not built".into()),
        }
    }
}

impl StoreError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}

/// A nearest-neighbor match.
#[derive(Debug, Clone)]
pub struct NeighborHit {
    pub id: Uuid,
    pub distance: f32,
}

/// Embedding store over a pluggable backend with a vector side index.
pub struct EmbeddingStore {
    /// The backend used for storage, abstracted behind a trait.
    backend: Arc<dyn StoreBackend>,
    /// The configuration for the store.
    cfg: StoreConfig,
    /// Side index over all stored vectors for nearest-neighbor queries.
    vectors: RwLock<AnnIndex>,
}

impl EmbeddingStore {
    /// Initialize or open a store using the configured backend.
    ///
    /// Validates the persisted dimension marker against the configured
    /// `embedding_dim` and loads the vector side index from existing
    /// records.
    pub fn open(cfg: StoreConfig) -> Result<Self, StoreError> {
        let backend = cfg.backend.build()?;
        Self::with_backend(cfg, backend)
    }

    /// Build a store with a custom backend (e.g., in-memory for tests).
    pub fn with_backend(
        cfg: StoreConfig,
        backend: Box<dyn StoreBackend>,
    ) -> Result<Self, StoreError> {
        let store = Self {
            vectors: RwLock::new(AnnIndex::new(cfg.embedding_dim, cfg.ann)),
            backend: Arc::from(backend),
            cfg,
        };
        store.check_schema()?;
        store.load_vectors()?;
        debug!(
            embedding_dim = store.cfg.embedding_dim,
            loaded = store.len(),
            "embedding store opened"
        );
        Ok(store)
    }

    fn check_schema(&self) -> Result<(), StoreError> {
        match self.backend.get(SCHEMA_DIM_KEY)? {
            Some(bytes) => {
                let arr: [u8; 4] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::Decode("malformed dimension marker".into()))?;
                let found = u32::from_le_bytes(arr) as usize;
                if found != self.cfg.embedding_dim {
                    warn!(
                        expected = self.cfg.embedding_dim,
                        found, "embedding dimension does not match the stored schema marker"
                    );
                    return Err(StoreError::SchemaMismatch {
                        expected: self.cfg.embedding_dim,
                        found,
                    });
                }
                Ok(())
            }
            None => {
                let bytes = (self.cfg.embedding_dim as u32).to_le_bytes();
                self.backend.put(SCHEMA_DIM_KEY, &bytes)
            }
        }
    }

    fn load_vectors(&self) -> Result<(), StoreError> {
        let mut index = self.vectors.write().unwrap();
        self.backend.scan(&mut |key, data| {
            if !key.starts_with(EMBEDDING_KEY_PREFIX) {
                return Ok(());
            }
            let record = self.decode_record(data)?;
            index.insert(record.id, record.vector)?;
            Ok(())
        })
    }

    fn embedding_key(id: &Uuid) -> String {
        format!("{EMBEDDING_KEY_PREFIX}{id}")
    }

    /// Dimension the store was configured with.
    pub fn embedding_dim(&self) -> usize {
        self.cfg.embedding_dim
    }

    /// Insert or update a record.
    /// The record is encoded and compressed before being sent to the backend.
    pub fn insert(&self, rec: &EmbeddingRecord) -> Result<(), StoreError> {
        if rec.vector.len() != self.cfg.embedding_dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.cfg.embedding_dim,
                got: rec.vector.len(),
            });
        }

        let payload = self.encode_record(rec)?;
        self.backend.put(&Self::embedding_key(&rec.id), &payload)?;

        let mut index = self.vectors.write().unwrap();
        index.insert(rec.id, rec.vector.clone())?;
        Ok(())
    }

    /// Retrieve a record by id.
    pub fn get(&self, id: &Uuid) -> Result<Option<EmbeddingRecord>, StoreError> {
        if let Some(data) = self.backend.get(&Self::embedding_key(id))? {
            let record = self.decode_record(&data)?;
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    /// Replace the vector of an existing record, leaving content and
    /// metadata untouched. Returns the number of records affected (0 when
    /// the id is unknown, 1 on success), mirroring a row-count check.
    pub fn update_vector(&self, id: &Uuid, vector: &[f32]) -> Result<u64, StoreError> {
        if vector.len() != self.cfg.embedding_dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.cfg.embedding_dim,
                got: vector.len(),
            });
        }

        let Some(mut record) = self.get(id)? else {
            return Ok(0);
        };

        record.vector = vector.to_vec();
        let payload = self.encode_record(&record)?;
        self.backend.put(&Self::embedding_key(id), &payload)?;

        let mut index = self.vectors.write().unwrap();
        index.update(id, vector)?;
        Ok(1)
    }

    /// Find the `k` stored embeddings closest to `query` by L2 distance,
    /// ascending.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<NeighborHit>, StoreError> {
        let mut index = self.vectors.write().unwrap();
        let results = index.search(query, k)?;
        Ok(results
            .into_iter()
            .filter_map(|r| {
                index.get_id(r.index).map(|id| NeighborHit {
                    id: *id,
                    distance: r.distance,
                })
            })
            .collect())
    }

    /// Remove a record from the store and drop its vector from the side
    /// index so `nearest` stops returning it.
    pub fn delete(&self, id: &Uuid) -> Result<(), StoreError> {
        self.backend.delete(&Self::embedding_key(id))?;
        let mut index = self.vectors.write().unwrap();
        index.remove(id);
        debug!(%id, "embedding deleted");
        Ok(())
    }

    /// Number of embeddings in the store.
    pub fn len(&self) -> usize {
        self.vectors.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.read().unwrap().is_empty()
    }

    /// Flush backend buffers if supported.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.backend.flush()
    }

    /// Expose the backend so other stores (the learning log) can share one
    /// database file through their own key prefixes.
    pub fn backend(&self) -> Arc<dyn StoreBackend> {
        Arc::clone(&self.backend)
    }

    /// Decodes and decompresses a record from the backend.
    fn decode_record(&self, data: &[u8]) -> Result<EmbeddingRecord, StoreError> {
        let decompressed = self.cfg.compression.decompress(data)?;
        let (record, _) = decode_from_slice(&decompressed, standard())?;
        Ok(record)
    }

    /// Encodes and compresses a record for storage in the backend.
    fn encode_record(&self, rec: &EmbeddingRecord) -> Result<Vec<u8>, StoreError> {
        let encoded = encode_to_vec(rec, standard())?;
        self.cfg.compression.compress(&encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_store(dim: usize) -> EmbeddingStore {
        let cfg = StoreConfig::new()
            .with_backend(BackendConfig::in_memory())
            .with_embedding_dim(dim);
        EmbeddingStore::open(cfg).unwrap()
    }

    fn sample_record(dim: usize, affordances: &[&str]) -> EmbeddingRecord {
        EmbeddingRecord::new(
            vec![0.5; dim],
            Some("the red cube".into()),
            json!({ "gesture_affordances": affordances, "currentDocumentName": "scene-1" }),
        )
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let store = test_store(4);
        let rec = sample_record(4, &["grab", "select"]);
        store.insert(&rec).unwrap();

        let fetched = store.get(&rec.id).unwrap().expect("record exists");
        assert_eq!(fetched.id, rec.id);
        assert_eq!(fetched.vector, rec.vector);
        assert_eq!(fetched.metadata, rec.metadata);
        assert_eq!(fetched.gesture_affordances(), vec!["grab", "select"]);
    }

    #[test]
    fn missing_record_is_none() {
        let store = test_store(4);
        assert!(store.get(&Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn insert_rejects_wrong_dimension() {
        let store = test_store(4);
        let rec = sample_record(3, &[]);
        let err = store.insert(&rec).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 4,
                got: 3
            }
        ));
    }

    #[test]
    fn update_vector_reports_rows_affected() {
        let store = test_store(4);
        let rec = sample_record(4, &["grab"]);
        store.insert(&rec).unwrap();

        assert_eq!(store.update_vector(&rec.id, &[1.0, 0.0, 0.0, 0.0]).unwrap(), 1);
        assert_eq!(store.update_vector(&Uuid::new_v4(), &[1.0, 0.0, 0.0, 0.0]).unwrap(), 0);

        let fetched = store.get(&rec.id).unwrap().unwrap();
        assert_eq!(fetched.vector, vec![1.0, 0.0, 0.0, 0.0]);
        // content and metadata survive the vector swap
        assert_eq!(fetched.content.as_deref(), Some("the red cube"));
        assert_eq!(fetched.gesture_affordances(), vec!["grab"]);
    }

    #[test]
    fn nearest_orders_by_distance() {
        let store = test_store(2);
        let near = EmbeddingRecord::new(vec![0.9, 0.1], None, json!({}));
        let far = EmbeddingRecord::new(vec![-1.0, -1.0], None, json!({}));
        store.insert(&near).unwrap();
        store.insert(&far).unwrap();

        let hits = store.nearest(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, near.id);
        assert!(hits[0].distance < hits[1].distance);
    }

    #[test]
    fn delete_removes_from_side_index() {
        let store = test_store(2);
        let gone = EmbeddingRecord::new(vec![1.0, 0.0], None, json!({}));
        let kept = EmbeddingRecord::new(vec![0.0, 1.0], None, json!({}));
        store.insert(&gone).unwrap();
        store.insert(&kept).unwrap();

        store.delete(&gone.id).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.get(&gone.id).unwrap().is_none());
        // The deleted vector must not win nearest even at its own position
        let hits = store.nearest(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, kept.id);
    }

    #[test]
    fn nearest_sees_updated_vectors() {
        let store = test_store(2);
        let a = EmbeddingRecord::new(vec![1.0, 0.0], None, json!({}));
        let b = EmbeddingRecord::new(vec![0.0, 1.0], None, json!({}));
        store.insert(&a).unwrap();
        store.insert(&b).unwrap();

        // Move `b` on top of the query point
        store.update_vector(&b.id, &[1.0, 0.1]).unwrap();
        let hits = store.nearest(&[1.0, 0.1], 1).unwrap();
        assert_eq!(hits[0].id, b.id);
    }

    #[test]
    fn malformed_affordances_mean_none() {
        let store = test_store(2);
        let rec = EmbeddingRecord::new(
            vec![0.0, 0.0],
            None,
            json!({ "gesture_affordances": "not-an-array" }),
        );
        store.insert(&rec).unwrap();

        let fetched = store.get(&rec.id).unwrap().unwrap();
        assert!(fetched.gesture_affordances().is_empty());

        let no_meta = EmbeddingRecord::new(vec![0.0, 0.0], None, json!({}));
        assert!(no_meta.gesture_affordances().is_empty());
    }

    #[test]
    fn reopen_restores_side_index() {
        use tempfile::NamedTempFile;
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path().to_string_lossy().to_string();

        let cfg = StoreConfig::new()
            .with_backend(BackendConfig::redb(&path))
            .with_embedding_dim(2);
        let rec = EmbeddingRecord::new(vec![1.0, 0.0], None, json!({}));
        {
            let store = EmbeddingStore::open(cfg.clone()).unwrap();
            store.insert(&rec).unwrap();
        }

        {
            let reopened = EmbeddingStore::open(cfg).unwrap();
            assert_eq!(reopened.len(), 1);
            let hits = reopened.nearest(&[1.0, 0.0], 1).unwrap();
            assert_eq!(hits[0].id, rec.id);
        }

        // A mismatched dimension is refused outright; the database must be
        // closed first or the open fails on the file lock instead
        let wrong = StoreConfig::new()
            .with_backend(BackendConfig::redb(&path))
            .with_embedding_dim(3);
        let err = EmbeddingStore::open(wrong).err().unwrap();
        assert!(matches!(
            err,
            StoreError::SchemaMismatch {
                expected: 3,
                found: 2
            }
        ));
    }
}
