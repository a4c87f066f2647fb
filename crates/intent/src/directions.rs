//! Named semantic direction vectors.
//!
//! Each supported intent type maps to a fixed direction in embedding space.
//! The registry is built once at process start and handed to the applier
//! explicitly; nothing in this crate keeps global state.

use std::collections::HashMap;

use crate::l2_normalize_in_place;

/// Errors raised while constructing a [`SemanticDirections`] registry.
#[derive(Debug, thiserror::Error)]
pub enum DirectionError {
    #[error("direction '{name}' has dimension {got}, expected {expected}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
}

/// Immutable registry of named direction vectors.
///
/// Non-zero directions are L2-normalized at construction so every lookup
/// returns a unit vector. All-zero directions are permitted and mean "this
/// intent type moves nothing" (e.g. `navigate`).
#[derive(Debug, Clone)]
pub struct SemanticDirections {
    dim: usize,
    directions: HashMap<String, Vec<f32>>,
}

impl SemanticDirections {
    /// Start building a registry for vectors of the given dimension.
    pub fn builder(dim: usize) -> SemanticDirectionsBuilder {
        SemanticDirectionsBuilder {
            dim,
            directions: HashMap::new(),
        }
    }

    /// The built-in direction table: `select`, `grab`, and `navigate`.
    ///
    /// `select` and `grab` are mirror-image patterns; `navigate` is the zero
    /// vector, so applying it only renormalizes the target.
    pub fn defaults(dim: usize) -> Self {
        let select: Vec<f32> = (0..dim)
            .map(|i| {
                if i < 10 {
                    0.05
                } else if i < 20 {
                    -0.05
                } else {
                    0.01
                }
            })
            .collect();
        let grab: Vec<f32> = select.iter().map(|v| -v).collect();
        let navigate = vec![0.0; dim];

        let registry = Self::builder(dim)
            .direction("select", select)
            .direction("grab", grab)
            .direction("navigate", navigate)
            .build();

        match registry {
            Ok(registry) => registry,
            // All three defaults are constructed at `dim`, so this cannot
            // fail; keep the panic message descriptive regardless.
            Err(err) => unreachable!("default direction table invalid: {err}"),
        }
    }

    /// Resolve the unit direction for an intent type.
    pub fn resolve(&self, intent_type: &str) -> Option<&[f32]> {
        self.directions.get(intent_type).map(Vec::as_slice)
    }

    /// Registered intent type names, unordered.
    pub fn names(&self) -> Vec<&str> {
        self.directions.keys().map(String::as_str).collect()
    }

    /// Vector dimension every direction in this registry has.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }
}

/// Builder for [`SemanticDirections`].
pub struct SemanticDirectionsBuilder {
    dim: usize,
    directions: HashMap<String, Vec<f32>>,
}

impl SemanticDirectionsBuilder {
    /// Add a named direction. Dimension is validated at [`build`](Self::build).
    pub fn direction<N: Into<String>>(mut self, name: N, vector: Vec<f32>) -> Self {
        self.directions.insert(name.into(), vector);
        self
    }

    /// Validate dimensions and normalize non-zero directions.
    pub fn build(self) -> Result<SemanticDirections, DirectionError> {
        let mut directions = HashMap::with_capacity(self.directions.len());
        for (name, mut vector) in self.directions {
            if vector.len() != self.dim {
                return Err(DirectionError::DimensionMismatch {
                    name,
                    expected: self.dim,
                    got: vector.len(),
                });
            }
            l2_normalize_in_place(&mut vector);
            directions.insert(name, vector);
        }
        Ok(SemanticDirections {
            dim: self.dim,
            directions,
        })
    }
}
