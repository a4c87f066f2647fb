use dashmap::DashMap;
use intent::{IntentVector, SemanticDirections};
use learning::ActionResult;
use ndarray::Array1;
use std::sync::Arc;
use store::{EmbeddingRecord, EmbeddingStore};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::IntentOutcome;

/// Applies a gated vector mutation to the resolved context embedding.
///
/// Each step short-circuits to a terminal outcome, and every exit path
/// returns through the same `IntentOutcome` value so the coordinator can
/// write exactly one audit entry per invocation.
///
/// Mutations on the same embedding id are serialized through a per-id
/// mutex; the base vector is re-read inside the critical section so
/// concurrent intents compose instead of losing updates.
pub struct IntentApplier {
    store: Arc<EmbeddingStore>,
    directions: Arc<SemanticDirections>,
    embedding_dim: usize,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl IntentApplier {
    pub fn new(
        store: Arc<EmbeddingStore>,
        directions: Arc<SemanticDirections>,
        embedding_dim: usize,
    ) -> Self {
        Self {
            store,
            directions,
            embedding_dim,
            locks: DashMap::new(),
        }
    }

    pub async fn apply(
        &self,
        user_id: &str,
        intent: &IntentVector,
        context: Option<&EmbeddingRecord>,
    ) -> IntentOutcome {
        let intent_type = intent.intent_type.as_str();

        // 1. A context embedding is required.
        let Some(record) = context else {
            return IntentOutcome::error("Context embedding was not provided.");
        };
        let embedding_id = record.id;

        // 2. Affordance gate.
        let available_gestures = record.gesture_affordances();
        if !available_gestures.iter().any(|g| g == intent_type) {
            let listed = available_gestures.join(", ");
            info!(
                user_id,
                %embedding_id,
                "intent '{intent_type}' refused by affordance gate"
            );
            return IntentOutcome {
                status: ActionResult::Ignored,
                message: format!(
                    "Intent '{intent_type}' is not applicable to this context \
                     (Embedding ID: {embedding_id}). Available gestures: [{listed}]"
                ),
                modified_embedding_id: None,
                available_gestures: Some(available_gestures),
                context_embedding_id: Some(embedding_id),
            };
        }

        // 3. Direction lookup.
        let Some(direction) = self.directions.resolve(intent_type) else {
            return IntentOutcome {
                status: ActionResult::Ignored,
                message: format!("Intent type '{intent_type}' has no defined vector operation."),
                modified_embedding_id: None,
                available_gestures: None,
                context_embedding_id: Some(embedding_id),
            };
        };

        // 4. Dimension checks, direction first.
        if direction.len() != self.embedding_dim {
            warn!(
                %embedding_id,
                "direction for '{intent_type}' has dim {}, expected {}",
                direction.len(),
                self.embedding_dim
            );
            return IntentOutcome {
                context_embedding_id: Some(embedding_id),
                ..IntentOutcome::error(format!(
                    "Internal configuration error for intent type '{intent_type}' (dimension mismatch)."
                ))
            };
        }

        // Serialize mutations per embedding id. The entry is pruned once the
        // last holder releases it, so the map tracks ids under contention
        // rather than every id ever touched.
        let lock = {
            let entry = self.locks.entry(embedding_id).or_default();
            Arc::clone(entry.value())
        };
        let outcome = {
            let _guard = lock.lock().await;
            self.mutate_embedding(user_id, intent_type, intent.intensity, embedding_id, direction)
                .await
        };
        drop(lock);
        self.locks
            .remove_if(&embedding_id, |_, holders| Arc::strong_count(holders) == 1);
        outcome
    }

    /// Steps 5 and 6, run under the per-id mutex.
    async fn mutate_embedding(
        &self,
        user_id: &str,
        intent_type: &str,
        intensity: f32,
        embedding_id: Uuid,
        direction: &[f32],
    ) -> IntentOutcome {
        // Re-read the base vector inside the critical section so a
        // concurrent mutation that won the lock first is observed.
        let base = match self.store.get(&embedding_id) {
            Ok(Some(current)) => current.vector,
            Ok(None) => {
                return IntentOutcome {
                    context_embedding_id: Some(embedding_id),
                    ..IntentOutcome::error(format!(
                        "Failed to update embedding for intent type '{intent_type}'."
                    ))
                };
            }
            Err(e) => {
                warn!(%embedding_id, "storage read failed while applying '{intent_type}': {e}");
                return IntentOutcome {
                    context_embedding_id: Some(embedding_id),
                    ..IntentOutcome::error(format!(
                        "Failed to update embedding for intent type '{intent_type}'."
                    ))
                };
            }
        };

        if base.len() != self.embedding_dim {
            warn!(
                %embedding_id,
                "stored vector has dim {}, expected {}",
                base.len(),
                self.embedding_dim
            );
            return IntentOutcome {
                context_embedding_id: Some(embedding_id),
                ..IntentOutcome::error("Corrupted base embedding data (dimension mismatch).")
            };
        }

        // 5. Mutation with renormalization.
        let base = Array1::from_vec(base);
        let direction = Array1::from_vec(direction.to_vec());
        let mut mutated = &base + &(&direction * intensity);
        let norm = mutated.dot(&mutated).sqrt();
        if norm == 0.0 {
            // A zero-norm result keeps the pre-mutation vector.
            mutated = base;
        } else {
            mutated.mapv_inplace(|x| x / norm);
        }

        // 6. Point update by id, checked through the affected-row count.
        let rows = match self
            .store
            .update_vector(&embedding_id, mutated.as_slice().unwrap_or(&[]))
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(%embedding_id, "storage write failed while applying '{intent_type}': {e}");
                0
            }
        };

        if rows == 0 {
            return IntentOutcome {
                context_embedding_id: Some(embedding_id),
                ..IntentOutcome::error(format!(
                    "Failed to update embedding for intent type '{intent_type}'."
                ))
            };
        }

        info!(user_id, %embedding_id, "intent '{intent_type}' applied");
        IntentOutcome {
            status: ActionResult::Success,
            message: format!(
                "Intent '{intent_type}' applied. Embedding '{embedding_id}' was modified."
            ),
            modified_embedding_id: Some(embedding_id),
            available_gestures: None,
            context_embedding_id: Some(embedding_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use store::{BackendConfig, StoreConfig};

    const DIM: usize = 16;

    fn test_store(dim: usize) -> Arc<EmbeddingStore> {
        let cfg = StoreConfig::new()
            .with_backend(BackendConfig::in_memory())
            .with_embedding_dim(dim);
        Arc::new(EmbeddingStore::open(cfg).unwrap())
    }

    fn applier(store: Arc<EmbeddingStore>, dim: usize) -> IntentApplier {
        IntentApplier::new(store, Arc::new(SemanticDirections::defaults(dim)), dim)
    }

    fn intent(intent_type: &str, intensity: f32) -> IntentVector {
        IntentVector {
            intent_type: intent_type.into(),
            intensity,
            target_context: serde_json::Map::new(),
        }
    }

    fn unit_record(dim: usize, affordances: &[&str]) -> EmbeddingRecord {
        let mut vector = vec![0.0; dim];
        vector[0] = 1.0;
        EmbeddingRecord::new(
            vector,
            None,
            json!({ "gesture_affordances": affordances }),
        )
    }

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn missing_context_is_an_error() {
        let store = test_store(DIM);
        let a = applier(Arc::clone(&store), DIM);

        let outcome = a.apply("user-a", &intent("select", 0.2), None).await;
        assert_eq!(outcome.status, ActionResult::Error);
        assert_eq!(outcome.message, "Context embedding was not provided.");
        assert!(outcome.modified_embedding_id.is_none());
    }

    #[tokio::test]
    async fn afforded_intent_mutates_and_renormalizes() {
        let store = test_store(DIM);
        let rec = unit_record(DIM, &["select", "grab"]);
        store.insert(&rec).unwrap();

        let a = applier(Arc::clone(&store), DIM);
        let outcome = a.apply("user-a", &intent("select", 0.2), Some(&rec)).await;

        assert_eq!(outcome.status, ActionResult::Success);
        assert_eq!(outcome.modified_embedding_id, Some(rec.id));
        assert!(outcome.message.contains("was modified"));

        let stored = store.get(&rec.id).unwrap().unwrap();
        assert!((norm(&stored.vector) - 1.0).abs() < 1e-5);
        assert_ne!(stored.vector, rec.vector);
    }

    #[tokio::test]
    async fn unafforded_intent_is_ignored_and_leaves_vector_untouched() {
        let store = test_store(DIM);
        let rec = unit_record(DIM, &["navigate"]);
        store.insert(&rec).unwrap();

        let a = applier(Arc::clone(&store), DIM);
        let outcome = a.apply("user-a", &intent("grab", 0.9), Some(&rec)).await;

        assert_eq!(outcome.status, ActionResult::Ignored);
        assert!(outcome.message.contains("Available gestures"));
        assert_eq!(outcome.available_gestures, Some(vec!["navigate".to_string()]));

        let stored = store.get(&rec.id).unwrap().unwrap();
        assert_eq!(stored.vector, rec.vector);
    }

    #[tokio::test]
    async fn empty_affordances_refuse_everything() {
        let store = test_store(DIM);
        let rec = EmbeddingRecord::new(
            vec![1.0; DIM],
            None,
            json!({ "gesture_affordances": "malformed" }),
        );
        store.insert(&rec).unwrap();

        let a = applier(Arc::clone(&store), DIM);
        let outcome = a.apply("user-a", &intent("select", 0.5), Some(&rec)).await;
        assert_eq!(outcome.status, ActionResult::Ignored);
        assert_eq!(outcome.available_gestures, Some(Vec::new()));
    }

    #[tokio::test]
    async fn unregistered_intent_type_is_ignored() {
        let store = test_store(DIM);
        let rec = unit_record(DIM, &["teleport"]);
        store.insert(&rec).unwrap();

        let a = applier(Arc::clone(&store), DIM);
        let outcome = a.apply("user-a", &intent("teleport", 0.5), Some(&rec)).await;

        assert_eq!(outcome.status, ActionResult::Ignored);
        assert!(outcome.message.contains("no defined vector operation"));

        let stored = store.get(&rec.id).unwrap().unwrap();
        assert_eq!(stored.vector, rec.vector);
    }

    #[tokio::test]
    async fn direction_dimension_mismatch_is_a_configuration_error() {
        let store = test_store(DIM);
        let rec = unit_record(DIM, &["select"]);
        store.insert(&rec).unwrap();

        // Registry built for a different dimension than the applier expects
        let short = SemanticDirections::defaults(DIM / 2);
        let a = IntentApplier::new(Arc::clone(&store), Arc::new(short), DIM);
        let outcome = a.apply("user-a", &intent("select", 0.5), Some(&rec)).await;

        assert_eq!(outcome.status, ActionResult::Error);
        assert!(outcome.message.contains("Internal configuration error"));
        assert!(outcome.message.contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn corrupted_base_dimension_is_an_error() {
        // Store accepts 8-d vectors but the applier is configured for 16
        let store = test_store(DIM / 2);
        let rec = unit_record(DIM / 2, &["select"]);
        store.insert(&rec).unwrap();

        let a = applier(Arc::clone(&store), DIM);
        let outcome = a.apply("user-a", &intent("select", 0.5), Some(&rec)).await;

        assert_eq!(outcome.status, ActionResult::Error);
        assert_eq!(
            outcome.message,
            "Corrupted base embedding data (dimension mismatch)."
        );

        let stored = store.get(&rec.id).unwrap().unwrap();
        assert_eq!(stored.vector, rec.vector);
    }

    #[tokio::test]
    async fn vanished_record_reports_update_failure() {
        let store = test_store(DIM);
        let rec = unit_record(DIM, &["select"]);
        // Never inserted: the re-read under lock finds nothing

        let a = applier(Arc::clone(&store), DIM);
        let outcome = a.apply("user-a", &intent("select", 0.5), Some(&rec)).await;

        assert_eq!(outcome.status, ActionResult::Error);
        assert!(outcome.message.contains("Failed to update embedding"));
    }

    #[tokio::test]
    async fn zero_norm_result_keeps_base_vector() {
        let store = test_store(DIM);
        // Base chosen so base + select * 1.0 cancels exactly: base = -direction
        let directions = SemanticDirections::defaults(DIM);
        let select = directions.resolve("select").unwrap();
        let base: Vec<f32> = select.iter().map(|x| -x).collect();
        let rec = EmbeddingRecord::new(
            base.clone(),
            None,
            json!({ "gesture_affordances": ["select"] }),
        );
        store.insert(&rec).unwrap();

        let a = IntentApplier::new(Arc::clone(&store), Arc::new(directions), DIM);
        let outcome = a.apply("user-a", &intent("select", 1.0), Some(&rec)).await;

        assert_eq!(outcome.status, ActionResult::Success);
        let stored = store.get(&rec.id).unwrap().unwrap();
        assert_eq!(stored.vector, base);
    }

    #[tokio::test]
    async fn navigate_direction_is_a_no_op_mutation() {
        let store = test_store(DIM);
        let rec = unit_record(DIM, &["navigate"]);
        store.insert(&rec).unwrap();

        let a = applier(Arc::clone(&store), DIM);
        let outcome = a.apply("user-a", &intent("navigate", 0.9), Some(&rec)).await;

        // Zero direction leaves a unit base vector in place after renorm
        assert_eq!(outcome.status, ActionResult::Success);
        let stored = store.get(&rec.id).unwrap().unwrap();
        for (got, want) in stored.vector.iter().zip(rec.vector.iter()) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn concurrent_intents_on_one_embedding_compose() {
        let store = test_store(DIM);
        let rec = unit_record(DIM, &["select", "grab"]);
        store.insert(&rec).unwrap();

        let a = Arc::new(applier(Arc::clone(&store), DIM));

        let first = {
            let a = Arc::clone(&a);
            let rec = rec.clone();
            tokio::spawn(async move { a.apply("user-a", &intent("select", 0.4), Some(&rec)).await })
        };
        let second = {
            let a = Arc::clone(&a);
            let rec = rec.clone();
            tokio::spawn(async move { a.apply("user-b", &intent("grab", 0.4), Some(&rec)).await })
        };

        let o1 = first.await.unwrap();
        let o2 = second.await.unwrap();
        assert_eq!(o1.status, ActionResult::Success);
        assert_eq!(o2.status, ActionResult::Success);

        // Both mutations landed: the result differs from applying either
        // intent alone against the original base.
        let stored = store.get(&rec.id).unwrap().unwrap();
        assert!((norm(&stored.vector) - 1.0).abs() < 1e-5);

        let solo_store = test_store(DIM);
        solo_store.insert(&rec).unwrap();
        let solo = applier(Arc::clone(&solo_store), DIM);
        solo.apply("user-a", &intent("select", 0.4), Some(&rec)).await;
        let only_select = solo_store.get(&rec.id).unwrap().unwrap();
        assert_ne!(stored.vector, only_select.vector);
    }

    #[tokio::test]
    async fn per_id_locks_are_pruned_after_use() {
        let store = test_store(DIM);
        let a = applier(Arc::clone(&store), DIM);

        for _ in 0..3 {
            let rec = unit_record(DIM, &["select"]);
            store.insert(&rec).unwrap();
            let outcome = a.apply("user-a", &intent("select", 0.3), Some(&rec)).await;
            assert_eq!(outcome.status, ActionResult::Success);
        }

        assert!(a.locks.is_empty());
    }
}
