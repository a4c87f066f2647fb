use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::LearningLogEntry;

/// A drafted follow-up for an interaction a user flagged as poor.
#[derive(Debug, Clone)]
pub struct ImprovementTask {
    pub description: String,
    /// Id of the log entry the task was drafted from.
    pub source_entry: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Drafts improvement tasks from audit entries.
///
/// Only entries with an explicitly negative feedback signal produce a task;
/// everything else is ignored.
#[derive(Debug, Default)]
pub struct TaskGenerator;

impl TaskGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn draft(&self, entry: &LearningLogEntry) -> Option<ImprovementTask> {
        let feedback = entry.feedback_signal?;
        if feedback >= 0 {
            return None;
        }

        let context = entry
            .context_embedding_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string());

        Some(ImprovementTask {
            description: format!(
                "Review '{}' intent for user '{}' (result: {}, context: {}): {}",
                entry.intent_vector.intent_type,
                entry.user_id,
                entry.action_result,
                context,
                entry.result_message,
            ),
            source_entry: entry.id,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActionResult;
    use intent::IntentVector;

    fn entry(feedback: Option<i32>) -> LearningLogEntry {
        LearningLogEntry {
            id: Uuid::new_v4(),
            user_id: "user-a".into(),
            session_id: None,
            intent_vector: IntentVector {
                intent_type: "grab".into(),
                intensity: 0.8,
                target_context: serde_json::Map::new(),
            },
            context_embedding_id: None,
            action_result: ActionResult::Success,
            result_message: "Intent 'grab' applied.".into(),
            modified_embedding_id: None,
            feedback_signal: feedback,
            additional_metadata: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn negative_feedback_drafts_a_task() {
        let generator = TaskGenerator::new();
        let e = entry(Some(-2));
        let task = generator.draft(&e).expect("task drafted");
        assert_eq!(task.source_entry, e.id);
        assert!(task.description.contains("grab"));
        assert!(task.description.contains("user-a"));
    }

    #[test]
    fn non_negative_feedback_is_ignored() {
        let generator = TaskGenerator::new();
        assert!(generator.draft(&entry(None)).is_none());
        assert!(generator.draft(&entry(Some(0))).is_none());
        assert!(generator.draft(&entry(Some(3))).is_none());
    }
}
