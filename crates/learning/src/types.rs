use chrono::{DateTime, Utc};
use intent::IntentVector;
use serde::{Deserialize, Serialize};
use store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Outcome category of one intent application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionResult {
    /// The embedding was mutated (or intentionally left in place after a
    /// zero-norm result).
    Success,
    /// The intent was refused by the affordance gate.
    Ignored,
    /// Processing failed before or during mutation.
    Error,
}

impl ActionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionResult::Success => "success",
            ActionResult::Ignored => "ignored",
            ActionResult::Error => "error",
        }
    }
}

impl std::fmt::Display for ActionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningLogEntry {
    pub id: Uuid,
    pub user_id: String,
    pub session_id: Option<String>,
    /// Snapshot of the interpreted intent, exactly as applied.
    pub intent_vector: IntentVector,
    /// The embedding selected by context resolution, if any.
    pub context_embedding_id: Option<Uuid>,
    pub action_result: ActionResult,
    pub result_message: String,
    /// Set only when a mutation was persisted.
    pub modified_embedding_id: Option<Uuid>,
    /// Explicit user feedback; negative values flag poor interactions.
    pub feedback_signal: Option<i32>,
    pub additional_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Entry contents as produced by the pipeline; the log store assigns the
/// id and timestamp on append.
#[derive(Debug, Clone)]
pub struct NewLearningLogEntry {
    pub user_id: String,
    pub session_id: Option<String>,
    pub intent_vector: IntentVector,
    pub context_embedding_id: Option<Uuid>,
    pub action_result: ActionResult,
    pub result_message: String,
    pub modified_embedding_id: Option<Uuid>,
    pub feedback_signal: Option<i32>,
    pub additional_metadata: Option<serde_json::Value>,
}

/// Errors from the learning log.
#[derive(Debug, Error)]
pub enum LearningError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("log entry serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
