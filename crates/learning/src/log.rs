use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use store::{StoreBackend, LOG_KEY_PREFIX};
use uuid::Uuid;

use crate::{LearningError, LearningLogEntry, NewLearningLogEntry};

/// Append-only log over a shared key-value backend.
///
/// Entries live under the `log/` prefix with an RFC 3339 timestamp in the
/// key, so a key-ordered scan yields entries in chronological order.
/// Entries are stored as JSON (the intent snapshot nests arbitrary JSON,
/// which the binary record codec cannot carry).
pub struct LearningLogStore {
    backend: Arc<dyn StoreBackend>,
}

impl LearningLogStore {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self { backend }
    }

    fn entry_key(entry: &LearningLogEntry) -> String {
        let ts = entry
            .created_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true);
        format!("{LOG_KEY_PREFIX}{ts}/{}", entry.id)
    }

    /// Persist a new entry, assigning its id and timestamp. Returns the
    /// stored entry.
    pub fn append(&self, new: NewLearningLogEntry) -> Result<LearningLogEntry, LearningError> {
        let entry = LearningLogEntry {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            session_id: new.session_id,
            intent_vector: new.intent_vector,
            context_embedding_id: new.context_embedding_id,
            action_result: new.action_result,
            result_message: new.result_message,
            modified_embedding_id: new.modified_embedding_id,
            feedback_signal: new.feedback_signal,
            additional_metadata: new.additional_metadata,
            created_at: Utc::now(),
        };

        let bytes = serde_json::to_vec(&entry)?;
        self.backend.put(&Self::entry_key(&entry), &bytes)?;
        Ok(entry)
    }

    /// All entries in chronological order.
    pub fn entries(&self) -> Result<Vec<LearningLogEntry>, LearningError> {
        self.collect(|_| true, usize::MAX)
    }

    /// Entries for one user, oldest first, capped at `limit`.
    pub fn for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<LearningLogEntry>, LearningError> {
        self.collect(|entry| entry.user_id == user_id, limit)
    }

    /// Number of entries in the log.
    pub fn count(&self) -> Result<usize, LearningError> {
        Ok(self.entries()?.len())
    }

    fn collect(
        &self,
        keep: impl Fn(&LearningLogEntry) -> bool,
        limit: usize,
    ) -> Result<Vec<LearningLogEntry>, LearningError> {
        let mut out = Vec::new();
        let mut parse_error: Option<serde_json::Error> = None;

        self.backend.scan(&mut |key, value| {
            if !key.starts_with(LOG_KEY_PREFIX) || out.len() >= limit {
                return Ok(());
            }
            match serde_json::from_slice::<LearningLogEntry>(value) {
                Ok(entry) => {
                    if keep(&entry) {
                        out.push(entry);
                    }
                }
                Err(e) => {
                    if parse_error.is_none() {
                        parse_error = Some(e);
                    }
                }
            }
            Ok(())
        })?;

        match parse_error {
            Some(e) => Err(LearningError::Serialize(e)),
            None => Ok(out),
        }
    }
}
