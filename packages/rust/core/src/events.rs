//! Run progress events and the sink they are reported to.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use blogsmith_shared::{RunId, RunState, Stage};

/// Something observable that happened during a workflow run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started {
        run_id: RunId,
        at: DateTime<Utc>,
    },
    StateChanged {
        run_id: RunId,
        state: RunState,
    },
    /// A stage finished; `preview` holds the leading characters of its output.
    StageCompleted {
        run_id: RunId,
        stage: Stage,
        preview: String,
    },
    Completed {
        run_id: RunId,
        at: DateTime<Utc>,
        elapsed: Duration,
    },
    /// The run was abandoned while in `state`.
    Failed {
        run_id: RunId,
        state: RunState,
        error: String,
        at: DateTime<Utc>,
    },
    /// The generated post was kept for redelivery after a failed append.
    PostQueued {
        run_id: RunId,
    },
    Redelivered {
        post_id: String,
    },
    RedeliveryFailed {
        post_id: String,
        error: String,
    },
}

/// Receives run events. Implementations must not block.
pub trait RunEventSink: Send + Sync {
    fn emit(&self, event: &RunEvent);
}

/// Reports events as structured log lines.
pub struct TracingEventSink;

impl RunEventSink for TracingEventSink {
    fn emit(&self, event: &RunEvent) {
        match event {
            RunEvent::Started { run_id, at } => {
                info!(%run_id, started_at = %at, "starting workflow");
            }
            RunEvent::StateChanged { run_id, state } => {
                debug!(%run_id, %state, "state changed");
            }
            RunEvent::StageCompleted {
                run_id,
                stage,
                preview,
            } => {
                info!(%run_id, %stage, %preview, "stage output");
            }
            RunEvent::Completed {
                run_id,
                at,
                elapsed,
            } => {
                let elapsed_ms = elapsed.as_millis() as u64;
                info!(%run_id, completed_at = %at, elapsed_ms, "workflow completed");
            }
            RunEvent::Failed {
                run_id,
                state,
                error,
                at,
            } => {
                error!(%run_id, failed_in = %state, failed_at = %at, %error, "workflow failed");
            }
            RunEvent::PostQueued { run_id } => {
                warn!(%run_id, "blog post kept for redelivery");
            }
            RunEvent::Redelivered { post_id } => {
                info!(%post_id, "queued post delivered");
            }
            RunEvent::RedeliveryFailed { post_id, error } => {
                warn!(%post_id, %error, "queued post still undeliverable");
            }
        }
    }
}

/// Collects events in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: std::sync::Mutex<Vec<RunEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl RunEventSink for RecordingSink {
    fn emit(&self, event: &RunEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
