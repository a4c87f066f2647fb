//! Intent message types and extraction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Sentinel intent type used when the client message carries no `intent` key.
/// Rejection is deferred to the affordance gate rather than raised here.
pub const UNKNOWN_INTENT: &str = "unknown";

/// Intensity applied when the client does not provide one.
pub const DEFAULT_INTENSITY: f32 = 0.5;

/// Structured representation of a user's gestural intention.
///
/// Created once per inbound message and never mutated afterwards. The
/// snapshot stored in the learning log is this exact value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentVector {
    /// Intent type, e.g. `"select"` or `"grab"` (wire name: `type`).
    #[serde(rename = "type")]
    pub intent_type: String,
    /// Gesture intensity in `[0, 1]`. Scales the direction vector.
    pub intensity: f32,
    /// Free-form context hints supplied by the client.
    #[serde(default)]
    pub target_context: Map<String, Value>,
}

/// Normalize a raw client message into an [`IntentVector`].
///
/// Defaulting rules:
/// - absent or non-string `intent` yields [`UNKNOWN_INTENT`]
/// - absent or non-numeric `intensity` yields [`DEFAULT_INTENSITY`]; values
///   outside `[0, 1]` are clamped
/// - absent or non-object `context` yields an empty map
pub fn extract(raw: &Value) -> IntentVector {
    let intent_type = match raw.get("intent").and_then(Value::as_str) {
        Some(t) => t.to_string(),
        None => {
            debug!("message carries no usable 'intent' key, treating as unknown");
            UNKNOWN_INTENT.to_string()
        }
    };

    let intensity = raw
        .get("intensity")
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .unwrap_or(DEFAULT_INTENSITY)
        .clamp(0.0, 1.0);

    let target_context = raw
        .get("context")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    IntentVector {
        intent_type,
        intensity,
        target_context,
    }
}
