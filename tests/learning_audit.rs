//! Audit completeness: every pipeline invocation leaves exactly one entry in
//! the learning log, whatever branch terminated it.

use gip::{ActionResult, EmbeddingProvider, EmbeddingRecord, PipelineConfig, StubEmbedder};
use serde_json::json;
use uuid::Uuid;

const DIM: usize = 16;

fn config() -> PipelineConfig {
    PipelineConfig::default().with_embedding_dim(DIM)
}

async fn seed(pipeline: &gip::GesturePipeline, query: &str, affordances: &[&str]) -> Uuid {
    let embedder = StubEmbedder::new(DIM);
    let vector = embedder.embed(query).await.unwrap();
    let record = EmbeddingRecord::new(
        vector,
        Some(query.to_string()),
        json!({ "gesture_affordances": affordances }),
    );
    pipeline.store().insert(&record).unwrap();
    record.id
}

#[tokio::test]
async fn one_entry_per_invocation_across_all_branches() {
    let pipeline = gip::wire_in_memory(config()).unwrap();
    let id = seed(&pipeline, "scene.gltf", &["select"]).await;

    let ctx = json!({ "currentDocumentName": "scene.gltf" });

    // Success, refusal, unregistered type, and an unknown marker
    let messages = [
        json!({ "intent": "select", "intensity": 0.3, "context": ctx.clone() }),
        json!({ "intent": "grab", "intensity": 0.3, "context": ctx.clone() }),
        json!({ "intent": "teleport", "context": ctx }),
        json!({}),
    ];

    for message in &messages {
        pipeline.handle_intent("user-1", message).await;
    }
    pipeline.capture().flush().await;

    let entries = pipeline.learning_log().entries().unwrap();
    assert_eq!(entries.len(), messages.len());

    // Oldest first; the success entry records the mutated embedding
    assert_eq!(entries[0].action_result, ActionResult::Success);
    assert_eq!(entries[0].modified_embedding_id, Some(id));
    assert_eq!(entries[1].action_result, ActionResult::Ignored);
    assert!(entries[1].modified_embedding_id.is_none());
    assert_eq!(entries[1].context_embedding_id, Some(id));
}

#[tokio::test]
async fn error_branch_is_audited_too() {
    // Empty store: context resolution comes up empty, but the invocation
    // still lands in the log.
    let pipeline = gip::wire_in_memory(config()).unwrap();

    let response = pipeline
        .handle_intent("user-1", &json!({ "intent": "select" }))
        .await;
    assert_eq!(response.status, ActionResult::Error);

    pipeline.capture().flush().await;
    let entries = pipeline.learning_log().entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action_result, ActionResult::Error);
    assert_eq!(
        entries[0].result_message,
        "Could not find context for this intent."
    );
    assert!(entries[0].context_embedding_id.is_none());
}

#[tokio::test]
async fn session_and_feedback_are_captured() {
    let pipeline = gip::wire_in_memory(config()).unwrap();
    seed(&pipeline, "scene.gltf", &["select"]).await;

    let message = json!({
        "intent": "select",
        "intensity": 0.5,
        "context": {
            "currentDocumentName": "scene.gltf",
            "sessionId": "session-42",
            "feedbackSignal": -1
        }
    });
    pipeline.handle_intent("user-9", &message).await;
    pipeline.capture().flush().await;

    let entries = pipeline.learning_log().for_user("user-9", 10).unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.user_id, "user-9");
    assert_eq!(entry.session_id.as_deref(), Some("session-42"));
    assert_eq!(entry.feedback_signal, Some(-1));
    assert_eq!(entry.intent_vector.intent_type, "select");
}

#[tokio::test]
async fn concurrent_intents_each_get_an_entry() {
    let pipeline = gip::wire_in_memory(config()).unwrap();
    let id = seed(&pipeline, "scene.gltf", &["select", "grab"]).await;

    let ctx = json!({ "currentDocumentName": "scene.gltf" });
    let m1 = json!({ "intent": "select", "intensity": 0.4, "context": ctx.clone() });
    let m2 = json!({ "intent": "grab", "intensity": 0.4, "context": ctx });

    let (r1, r2) = tokio::join!(
        pipeline.handle_intent("user-a", &m1),
        pipeline.handle_intent("user-b", &m2),
    );
    assert_eq!(r1.status, ActionResult::Success);
    assert_eq!(r2.status, ActionResult::Success);

    pipeline.capture().flush().await;
    let entries = pipeline.learning_log().entries().unwrap();
    assert_eq!(entries.len(), 2);

    // Both mutations persisted against the same embedding and the stored
    // vector is still unit length.
    let stored = pipeline.store().get(&id).unwrap().unwrap();
    let norm: f32 = stored.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}
