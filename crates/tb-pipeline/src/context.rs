//! Progress reporting shared between a pipeline and its caller.

use std::time::Duration;

use serde::Serialize;

use crate::pipeline::PipelineState;

/// Immutable snapshot handed to the progress callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Pipeline label: its id, or the action name without one.
    pub pipeline: String,
    pub action: String,
    pub state: PipelineState,
    /// Index of the current stage.
    pub stage: usize,
    pub stages: usize,
    /// Logical name of the current stage's tool.
    pub tool: String,
    /// Progress of the current stage, 0-100.
    pub stage_progress: u8,
    /// Aggregate progress, 0-100, never decreasing.
    pub overall: u8,
    pub elapsed: Duration,
}

/// Sender for reporting progress from within a pipeline run.
///
/// Wraps a callback that receives a [`Progress`] snapshot.
pub struct ProgressSender {
    callback: Box<dyn Fn(&Progress) + Send + Sync>,
}

impl ProgressSender {
    /// Create a new sender from the given callback.
    pub fn new(callback: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Create a no-op sender that discards all progress reports.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    pub fn send(&self, progress: &Progress) {
        (self.callback)(progress);
    }
}

impl Default for ProgressSender {
    fn default() -> Self {
        Self::noop()
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn snapshot(overall: u8) -> Progress {
        Progress {
            pipeline: "job".into(),
            action: "exec".into(),
            state: PipelineState::Running { stage: 0 },
            stage: 0,
            stages: 1,
            tool: "sh".into(),
            stage_progress: overall,
            overall,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn sender_forwards_snapshots() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sender = ProgressSender::new(move |p| sink.lock().unwrap().push(p.overall));
        sender.send(&snapshot(10));
        sender.send(&snapshot(40));
        assert_eq!(*seen.lock().unwrap(), vec![10, 40]);
    }

    #[test]
    fn noop_discards() {
        ProgressSender::noop().send(&snapshot(5));
    }
}
