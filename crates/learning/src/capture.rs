use intent::IntentVector;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{ActionResult, LearningLogStore, NewLearningLogEntry, TaskGenerator};

/// Everything the pipeline knows about one processed gesture message.
///
/// Exactly one job is enqueued per coordinator invocation, whatever the
/// outcome, so the log stays a complete audit trail.
#[derive(Debug, Clone)]
pub struct CaptureJob {
    pub user_id: String,
    pub session_id: Option<String>,
    pub intent: IntentVector,
    pub context_embedding_id: Option<Uuid>,
    pub action_result: ActionResult,
    pub result_message: String,
    pub modified_embedding_id: Option<Uuid>,
    pub feedback_signal: Option<i32>,
}

impl CaptureJob {
    fn into_entry(self) -> NewLearningLogEntry {
        NewLearningLogEntry {
            user_id: self.user_id,
            session_id: self.session_id,
            intent_vector: self.intent,
            context_embedding_id: self.context_embedding_id,
            action_result: self.action_result,
            result_message: self.result_message,
            modified_embedding_id: self.modified_embedding_id,
            feedback_signal: self.feedback_signal,
            additional_metadata: None,
        }
    }
}

enum CaptureMessage {
    Job(Box<CaptureJob>),
    /// Ack once every job enqueued before this message has been written.
    Flush(oneshot::Sender<()>),
}

/// Supervised single writer for the learning log.
///
/// A bounded queue decouples gesture processing from log persistence. The
/// worker task is the only writer; a failed append is logged, counted, and
/// dropped. A full queue drops the newest job rather than blocking the
/// request path.
pub struct LearningCapture {
    tx: mpsc::Sender<CaptureMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LearningCapture {
    /// Start the capture worker. `queue_depth` bounds how many unwritten
    /// jobs may be outstanding.
    pub fn spawn(log: Arc<LearningLogStore>, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let worker = tokio::spawn(run_worker(log, rx));
        Self {
            tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Hand a job to the worker. Never blocks; on a full queue the job is
    /// dropped with a warning.
    pub fn enqueue(&self, job: CaptureJob) {
        match self.tx.try_send(CaptureMessage::Job(Box::new(job))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                counter!("gip_capture_dropped_total").increment(1);
                warn!("learning capture queue full, dropping audit entry");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                counter!("gip_capture_dropped_total").increment(1);
                error!("learning capture worker is gone, dropping audit entry");
            }
        }
    }

    /// Wait until every previously enqueued job has been written. Used by
    /// tests and graceful shutdown.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(CaptureMessage::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Drain the queue and stop the worker.
    pub async fn shutdown(&self) {
        self.flush().await;
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            // The queue is drained at this point, so stopping the idle
            // worker loses nothing.
            handle.abort();
            let _ = handle.await;
        }
    }
}

async fn run_worker(log: Arc<LearningLogStore>, mut rx: mpsc::Receiver<CaptureMessage>) {
    let generator = TaskGenerator::new();

    while let Some(message) = rx.recv().await {
        match message {
            CaptureMessage::Job(job) => {
                match log.append(job.into_entry()) {
                    Ok(entry) => {
                        counter!("gip_capture_appends_total").increment(1);
                        if let Some(task) = generator.draft(&entry) {
                            counter!("gip_improvement_tasks_total").increment(1);
                            tracing::info!(
                                source_entry = %task.source_entry,
                                "drafted improvement task: {}",
                                task.description
                            );
                        }
                    }
                    Err(e) => {
                        counter!("gip_capture_failures_total").increment(1);
                        error!("failed to append learning log entry: {e}");
                    }
                }
            }
            CaptureMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryBackend;

    fn job(user: &str, result: ActionResult, feedback: Option<i32>) -> CaptureJob {
        CaptureJob {
            user_id: user.to_string(),
            session_id: None,
            intent: IntentVector {
                intent_type: "select".into(),
                intensity: 0.5,
                target_context: serde_json::Map::new(),
            },
            context_embedding_id: None,
            action_result: result,
            result_message: "msg".into(),
            modified_embedding_id: None,
            feedback_signal: feedback,
        }
    }

    #[tokio::test]
    async fn enqueued_jobs_are_written() {
        let log = Arc::new(LearningLogStore::new(Arc::new(InMemoryBackend::new())));
        let capture = LearningCapture::spawn(Arc::clone(&log), 16);

        capture.enqueue(job("user-a", ActionResult::Success, None));
        capture.enqueue(job("user-a", ActionResult::Error, None));
        capture.flush().await;

        assert_eq!(log.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn flush_acks_after_prior_jobs() {
        let log = Arc::new(LearningLogStore::new(Arc::new(InMemoryBackend::new())));
        let capture = LearningCapture::spawn(Arc::clone(&log), 64);

        for _ in 0..20 {
            capture.enqueue(job("user-a", ActionResult::Ignored, None));
        }
        capture.flush().await;
        assert_eq!(log.count().unwrap(), 20);
    }

    #[tokio::test]
    async fn negative_feedback_survives_roundtrip() {
        let log = Arc::new(LearningLogStore::new(Arc::new(InMemoryBackend::new())));
        let capture = LearningCapture::spawn(Arc::clone(&log), 16);

        capture.enqueue(job("user-a", ActionResult::Success, Some(-1)));
        capture.flush().await;

        let entries = log.entries().unwrap();
        assert_eq!(entries[0].feedback_signal, Some(-1));
    }
}
