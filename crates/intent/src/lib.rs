//! # GIP Intent
//!
//! This crate owns the first stage of the gesture intent pipeline: turning a
//! raw client message into a typed [`IntentVector`], and the immutable
//! registry of named [`SemanticDirections`] that downstream stages use to
//! translate an intent type into a vector-space operation.
//!
//! Extraction never fails. Missing or malformed fields fall back to
//! well-known defaults (`"unknown"` intent type, `0.5` intensity, empty
//! context) so that rejection happens in later, better-informed stages.

mod directions;
mod types;

pub use directions::{DirectionError, SemanticDirections, SemanticDirectionsBuilder};
pub use types::{extract, IntentVector, DEFAULT_INTENSITY, UNKNOWN_INTENT};

/// In-place L2 normalization helper shared by the direction registry.
pub(crate) fn l2_normalize_in_place(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 {
        let inv_norm = norm_sq.sqrt().recip();
        for x in v.iter_mut() {
            *x *= inv_norm;
        }
    }
}
