//! # GIP Learning
//!
//! Append-only audit trail of intent applications. The pipeline records one
//! entry per processed gesture message (success, refusal, or failure) so
//! that interaction quality can be analyzed offline.
//!
//! Writes happen off the request path: the [`LearningCapture`] worker owns a
//! bounded queue and is the only writer to the log. When the queue is full
//! the entry is dropped with a warning rather than stalling gesture
//! processing.
//!
//! [`TaskGenerator`] drafts improvement tasks from entries carrying negative
//! feedback. Drafts are logged, not persisted or routed anywhere.

mod capture;
mod log;
mod tasks;
mod types;

pub use capture::{CaptureJob, LearningCapture};
pub use log::LearningLogStore;
pub use tasks::{ImprovementTask, TaskGenerator};
pub use types::{ActionResult, LearningError, LearningLogEntry, NewLearningLogEntry};
