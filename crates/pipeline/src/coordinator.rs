use learning::{ActionResult, CaptureJob, LearningCapture};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, error};

use crate::{ContextResolver, IntentApplier, IntentOutcome, IntentResponse};

/// Single entry point invoked per inbound gesture message.
///
/// Sequences extraction, context resolution, and application, then hands
/// exactly one capture job to the learning worker regardless of which
/// branch terminated the invocation. The response never waits on the audit
/// write.
pub struct Coordinator {
    resolver: ContextResolver,
    applier: IntentApplier,
    capture: Arc<LearningCapture>,
}

impl Coordinator {
    pub fn new(
        resolver: ContextResolver,
        applier: IntentApplier,
        capture: Arc<LearningCapture>,
    ) -> Self {
        Self {
            resolver,
            applier,
            capture,
        }
    }

    pub async fn handle_intent(&self, user_id: &str, raw: &serde_json::Value) -> IntentResponse {
        let intent = intent::extract(raw);
        debug!(
            user_id,
            intent_type = %intent.intent_type,
            intensity = intent.intensity,
            "processing gesture intent"
        );

        let session_id = intent
            .target_context
            .get("sessionId")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let feedback_signal = intent
            .target_context
            .get("feedbackSignal")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let outcome = match self.resolver.resolve(&intent).await {
            Ok(Some(record)) => self.applier.apply(user_id, &intent, Some(&record)).await,
            Ok(None) => IntentOutcome::error("Could not find context for this intent."),
            Err(e) => {
                error!(user_id, "context resolution failed: {e}");
                IntentOutcome::error(format!("Context lookup failed: {e}"))
            }
        };

        counter!("gip_intents_total", "status" => outcome.status.as_str()).increment(1);
        if outcome.status == ActionResult::Error {
            debug!(user_id, "intent terminated with error: {}", outcome.message);
        }

        self.capture.enqueue(CaptureJob {
            user_id: user_id.to_string(),
            session_id,
            intent: intent.clone(),
            context_embedding_id: outcome.context_embedding_id,
            action_result: outcome.status,
            result_message: outcome.message.clone(),
            modified_embedding_id: outcome.modified_embedding_id,
            feedback_signal,
        });

        IntentResponse::from(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GesturePipeline, PipelineConfig};
    use embedding::{EmbeddingProvider, StubEmbedder};
    use learning::LearningLogStore;
    use serde_json::json;
    use store::{BackendConfig, EmbeddingRecord, EmbeddingStore, StoreConfig};

    const DIM: usize = 16;

    async fn pipeline_with_record(affordances: &[&str]) -> (GesturePipeline, EmbeddingRecord) {
        let store_cfg = StoreConfig::new()
            .with_backend(BackendConfig::in_memory())
            .with_embedding_dim(DIM);
        let store = Arc::new(EmbeddingStore::open(store_cfg).unwrap());
        let learning_log = Arc::new(LearningLogStore::new(store.backend()));

        let embedder = StubEmbedder::new(DIM);
        let vector = embedder.embed("scene-1").await.unwrap();
        let record = EmbeddingRecord::new(
            vector,
            Some("scene one".into()),
            json!({ "gesture_affordances": affordances }),
        );
        store.insert(&record).unwrap();

        let pipeline = GesturePipeline::new(
            PipelineConfig::new().with_embedding_dim(DIM),
            store,
            Arc::new(embedder),
            learning_log,
        )
        .unwrap();
        (pipeline, record)
    }

    fn message(intent: &str, intensity: f32) -> serde_json::Value {
        json!({
            "intent": intent,
            "intensity": intensity,
            "context": { "currentDocumentName": "scene-1", "sessionId": "session-1" }
        })
    }

    #[tokio::test]
    async fn successful_intent_returns_modified_id() {
        let (pipeline, record) = pipeline_with_record(&["select", "grab"]).await;

        let response = pipeline.handle_intent("user-a", &message("select", 0.2)).await;
        assert_eq!(response.status, ActionResult::Success);
        assert_eq!(response.modified_embedding_id, Some(record.id));
    }

    #[tokio::test]
    async fn empty_store_short_circuits_with_error() {
        let store_cfg = StoreConfig::new()
            .with_backend(BackendConfig::in_memory())
            .with_embedding_dim(DIM);
        let store = Arc::new(EmbeddingStore::open(store_cfg).unwrap());
        let learning_log = Arc::new(LearningLogStore::new(store.backend()));
        let pipeline = GesturePipeline::new(
            PipelineConfig::new().with_embedding_dim(DIM),
            store,
            Arc::new(StubEmbedder::new(DIM)),
            learning_log,
        )
        .unwrap();

        let response = pipeline.handle_intent("user-a", &json!({ "intent": "select" })).await;
        assert_eq!(response.status, ActionResult::Error);
        assert_eq!(response.message, "Could not find context for this intent.");
    }

    #[tokio::test]
    async fn every_branch_writes_exactly_one_audit_entry() {
        let (pipeline, _record) = pipeline_with_record(&["select"]).await;

        // success, ignored (affordance), ignored (unknown direction)
        pipeline.handle_intent("user-a", &message("select", 0.2)).await;
        pipeline.handle_intent("user-a", &message("grab", 0.2)).await;
        pipeline.handle_intent("user-a", &message("teleport", 0.2)).await;
        // missing intent key falls back to the unknown sentinel
        pipeline.handle_intent("user-a", &json!({})).await;

        pipeline.capture().flush().await;
        let entries = pipeline.learning_log().entries().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].action_result, ActionResult::Success);
        assert_eq!(entries[1].action_result, ActionResult::Ignored);
        assert_eq!(entries[2].action_result, ActionResult::Ignored);
        assert_eq!(entries[3].intent_vector.intent_type, "unknown");
    }

    #[tokio::test]
    async fn audit_entry_carries_session_and_feedback() {
        let (pipeline, record) = pipeline_with_record(&["select"]).await;

        let raw = json!({
            "intent": "select",
            "intensity": 0.4,
            "context": {
                "currentDocumentName": "scene-1",
                "sessionId": "session-9",
                "feedbackSignal": -1
            }
        });
        pipeline.handle_intent("user-a", &raw).await;
        pipeline.capture().flush().await;

        let entries = pipeline.learning_log().entries().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.session_id.as_deref(), Some("session-9"));
        assert_eq!(entry.feedback_signal, Some(-1));
        assert_eq!(entry.context_embedding_id, Some(record.id));
        assert_eq!(entry.modified_embedding_id, Some(record.id));
    }

    #[tokio::test]
    async fn response_omits_optional_fields_when_absent() {
        let (pipeline, _record) = pipeline_with_record(&["grab"]).await;

        let response = pipeline.handle_intent("user-a", &message("teleport", 0.2)).await;
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "ignored");
        assert!(value.get("modified_embedding_id").is_none());
        // Affordance refusals DO include the available gestures
        let refusal = pipeline.handle_intent("user-a", &message("select", 0.2)).await;
        let value = serde_json::to_value(&refusal).unwrap();
        assert_eq!(value["available_gestures"], json!(["grab"]));
    }
}
