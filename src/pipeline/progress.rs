//! Completion subscribers.
//!
//! Observers are told about each task as it finishes. They only watch;
//! nothing they do feeds back into reconciliation.

use std::sync::Mutex;

use tracing::{info, warn};

/// One finished task, as seen by an observer.
#[derive(Debug, Clone)]
pub struct CompletionEvent<'a> {
    pub stage: &'a str,
    pub index: usize,
    /// How many tasks have finished, including this one.
    pub completed: usize,
    pub total: usize,
    /// Short human-readable description of the genuine result, if any.
    pub detail: Option<&'a str>,
    /// Failure reason when the task did not produce a genuine result.
    pub failure: Option<&'a str>,
}

/// Receives a notification per finished task.
pub trait ProgressObserver: Send + Sync {
    fn on_complete(&self, event: &CompletionEvent<'_>);
}

/// Logs a running `[completed/total]` counter through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_complete(&self, event: &CompletionEvent<'_>) {
        match event.failure {
            None => info!(
                stage = event.stage,
                index = event.index,
                "[{}/{}] {}",
                event.completed,
                event.total,
                event.detail.unwrap_or("done"),
            ),
            Some(reason) => warn!(
                stage = event.stage,
                index = event.index,
                "[{}/{}] failed, using fallback: {}",
                event.completed,
                event.total,
                reason,
            ),
        }
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressObserver for SilentProgress {
    fn on_complete(&self, _event: &CompletionEvent<'_>) {}
}

/// Records `(index, completed, failed)` for each event. Useful in tests.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<(usize, usize, bool)>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of `(index, completed, failed)` in notification order.
    pub fn events(&self) -> Vec<(usize, usize, bool)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressObserver for RecordingProgress {
    fn on_complete(&self, event: &CompletionEvent<'_>) {
        if let Ok(mut events) = self.events.lock() {
            events.push((event.index, event.completed, event.failure.is_some()));
        }
    }
}
