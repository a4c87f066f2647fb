//! Approximate Nearest Neighbor (ANN) search using the HNSW algorithm.
//!
//! Context resolution needs the closest stored embedding to a query vector.
//! For small embedding sets an exact linear scan is used; once the set grows
//! past a configurable threshold the index switches to an HNSW graph for
//! sub-linear search. Mutated vectors mark the graph dirty and it is rebuilt
//! lazily on the next search.

use hnsw_rs::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

/// Configuration for ANN index construction.
#[derive(Debug, Clone, Copy)]
pub struct AnnConfig {
    /// Number of neighbors per node (higher = better recall, slower build).
    /// Default: 16
    pub m: usize,
    /// Size of dynamic candidate list during construction.
    /// Default: 200
    pub ef_construction: usize,
    /// Size of dynamic candidate list during search.
    /// Default: 50
    pub ef_search: usize,
    /// Maximum number of results to return from a search.
    /// Default: 100
    pub max_results: usize,
    /// Whether to use ANN or always fall back to linear scan.
    /// Default: true
    pub enabled: bool,
    /// Minimum number of vectors before ANN is used.
    /// Below this threshold, linear scan is used even if enabled=true.
    /// Default: 1000
    pub min_vectors_for_ann: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            max_results: 100,
            enabled: true,
            min_vectors_for_ann: 1000,
        }
    }
}

impl AnnConfig {
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_min_vectors_for_ann(mut self, min: usize) -> Self {
        self.min_vectors_for_ann = min;
        self
    }

    /// Check if ANN should be used given the current dataset size.
    pub fn should_use_ann(&self, num_vectors: usize) -> bool {
        self.enabled && num_vectors >= self.min_vectors_for_ann
    }
}

/// Result from an ANN search.
#[derive(Debug, Clone)]
pub struct AnnResult {
    /// Position of the vector in the index.
    pub index: usize,
    /// L2 distance to the query vector (lower = closer).
    pub distance: f32,
}

/// Error type for ANN operations.
#[derive(Debug, thiserror::Error)]
pub enum AnnError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Index not built")]
    NotBuilt,
}

/// ANN index over embedding ids (HNSW implementation).
pub struct AnnIndex {
    config: AnnConfig,
    dimension: usize,
    hnsw: Option<Hnsw<'static, f32, DistL2>>,
    id_to_index: HashMap<Uuid, usize>,
    index_to_id: HashMap<usize, Uuid>,
    vectors: Vec<Vec<f32>>,
    built: bool,
}

impl AnnIndex {
    /// Create a new empty ANN index.
    pub fn new(dimension: usize, config: AnnConfig) -> Self {
        Self {
            config,
            dimension,
            hnsw: None,
            id_to_index: HashMap::new(),
            index_to_id: HashMap::new(),
            vectors: Vec::new(),
            built: false,
        }
    }

    /// Insert a vector with its embedding id. If the id is already present
    /// the vector is replaced instead.
    pub fn insert(&mut self, id: Uuid, vector: Vec<f32>) -> Result<(), AnnError> {
        if vector.len() != self.dimension {
            return Err(AnnError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }

        if let Some(&index) = self.id_to_index.get(&id) {
            self.vectors[index] = vector;
        } else {
            let index = self.vectors.len();
            self.vectors.push(vector);
            self.id_to_index.insert(id, index);
            self.index_to_id.insert(index, id);
        }

        // Mark as needing rebuild
        self.built = false;

        Ok(())
    }

    /// Replace the vector for an existing id. Returns false when the id is
    /// not in the index.
    pub fn update(&mut self, id: &Uuid, vector: &[f32]) -> Result<bool, AnnError> {
        if vector.len() != self.dimension {
            return Err(AnnError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }

        match self.id_to_index.get(id) {
            Some(&index) => {
                self.vectors[index] = vector.to_vec();
                self.built = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove an id from the index. The last vector is swapped into the
    /// freed slot to keep positions dense. Returns false when the id is not
    /// in the index.
    pub fn remove(&mut self, id: &Uuid) -> bool {
        let Some(index) = self.id_to_index.remove(id) else {
            return false;
        };
        self.index_to_id.remove(&index);
        let last = self.vectors.len() - 1;
        self.vectors.swap_remove(index);

        if index != last {
            if let Some(moved) = self.index_to_id.remove(&last) {
                self.index_to_id.insert(index, moved);
                self.id_to_index.insert(moved, index);
            }
        }

        self.built = false;
        true
    }

    /// Search for nearest neighbors, building the HNSW graph first when it
    /// is stale and the dataset is large enough to benefit.
    pub fn search(&mut self, query: &[f32], k: usize) -> Result<Vec<AnnResult>, AnnError> {
        if query.len() != self.dimension {
            return Err(AnnError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }

        let k = k.min(self.config.max_results);

        if self.config.should_use_ann(self.vectors.len()) {
            if !self.built {
                self.build();
            }
            if self.hnsw.is_some() {
                return self.hnsw_search(query, k);
            }
        }

        self.linear_search(query, k)
    }

    /// HNSW-based approximate search.
    fn hnsw_search(&self, query: &[f32], k: usize) -> Result<Vec<AnnResult>, AnnError> {
        if let Some(ref hnsw) = self.hnsw {
            let ef = self.config.ef_search;
            let results: Vec<Neighbour> = hnsw.search(query, k, ef);

            Ok(results
                .into_iter()
                .map(|neighbour| AnnResult {
                    index: neighbour.get_origin_id(),
                    distance: neighbour.distance,
                })
                .collect())
        } else {
            Err(AnnError::NotBuilt)
        }
    }

    /// Linear search (exact, slow but accurate).
    fn linear_search(&self, query: &[f32], k: usize) -> Result<Vec<AnnResult>, AnnError> {
        if self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let mut distances: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vec)| (idx, l2_distance(query, vec)))
            .collect();

        // Sort by distance (ascending - lower is closer)
        distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let results = distances
            .into_iter()
            .take(k)
            .map(|(idx, dist)| AnnResult {
                index: idx,
                distance: dist,
            })
            .collect();

        Ok(results)
    }

    /// Get embedding id by index position.
    pub fn get_id(&self, index: usize) -> Option<&Uuid> {
        self.index_to_id.get(&index)
    }

    /// Get index position by embedding id.
    pub fn get_index(&self, id: &Uuid) -> Option<usize> {
        self.id_to_index.get(id).copied()
    }

    /// Number of vectors in the index.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Check if the HNSW graph is current.
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Build the HNSW graph. Sets below 10 vectors stay on linear search.
    pub fn build(&mut self) {
        if self.vectors.is_empty() {
            return;
        }

        let nb_elem = self.vectors.len();
        if nb_elem < 10 {
            self.built = true;
            return;
        }

        let nb_layer = 16.min((nb_elem as f32).ln().trunc() as usize);

        let hnsw = Hnsw::<f32, DistL2>::new(
            self.config.m,
            nb_elem,
            nb_layer,
            self.config.ef_construction,
            DistL2 {},
        );

        // The API expects &[(&Vec<f32>, usize)] so we pass references to the stored vectors
        let data_for_insertion: Vec<(&Vec<f32>, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vec)| (vec, idx))
            .collect();
        hnsw.parallel_insert(&data_for_insertion);

        self.hnsw = Some(hnsw);
        self.built = true;
    }

    /// Get current configuration.
    pub fn config(&self) -> &AnnConfig {
        &self.config
    }
}

/// Euclidean (L2) distance between two vectors.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
