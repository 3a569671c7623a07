//! One workflow run: topic → outline → revised outline → blog post → row.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{instrument, warn};

use blogsmith_shared::{
    BlogsmithError, Result, RunId, RunState, SheetAppender, Stage, WorkflowRun, preview,
};
use blogsmith_storage::Storage;

use crate::events::{RunEvent, RunEventSink, TracingEventSink};
use crate::scheduler::Job;
use crate::stages::Stages;

/// Characters of stage output included in progress events.
pub const PREVIEW_CHARS: usize = 100;

/// How a run ended.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: RunId,
    /// `Done` or `Failed`.
    pub state: RunState,
    /// Outputs of a successful run.
    pub run: Option<WorkflowRun>,
    /// State the run was in when it failed.
    pub failed_in: Option<RunState>,
    pub error: Option<BlogsmithError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }
}

/// Sequences the stages and the spreadsheet append for each run.
pub struct WorkflowRunner {
    stages: Stages,
    appender: Arc<dyn SheetAppender>,
    events: Arc<dyn RunEventSink>,
    storage: Option<Arc<Storage>>,
}

impl WorkflowRunner {
    pub fn new(stages: Stages, appender: Arc<dyn SheetAppender>) -> Self {
        Self {
            stages,
            appender,
            events: Arc::new(TracingEventSink),
            storage: None,
        }
    }

    /// Report events to `events` instead of the log.
    pub fn with_events(mut self, events: Arc<dyn RunEventSink>) -> Self {
        self.events = events;
        self
    }

    /// Record runs and queue undelivered posts in `storage`.
    pub fn with_storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Execute one complete run. Failures are reported, never returned.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> RunOutcome {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let clock = Instant::now();

        self.events.emit(&RunEvent::Started {
            run_id,
            at: started_at,
        });
        self.ledger_start(run_id, started_at).await;
        self.redeliver_pending().await;

        let mut state = RunState::Idle;
        match self.execute(run_id, started_at, &mut state).await {
            Ok(run) => {
                self.events.emit(&RunEvent::Completed {
                    run_id,
                    at: run.finished_at,
                    elapsed: clock.elapsed(),
                });
                self.ledger_finish(
                    run_id,
                    RunState::Done,
                    None,
                    Some(preview(&run.blog_post, PREVIEW_CHARS)),
                )
                .await;
                RunOutcome {
                    run_id,
                    state: RunState::Done,
                    run: Some(run),
                    failed_in: None,
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                self.events.emit(&RunEvent::Failed {
                    run_id,
                    state,
                    error: message.clone(),
                    at: Utc::now(),
                });
                self.ledger_finish(run_id, RunState::Failed, Some(&message), None)
                    .await;
                RunOutcome {
                    run_id,
                    state: RunState::Failed,
                    run: None,
                    failed_in: Some(state),
                    error: Some(e),
                }
            }
        }
    }

    async fn execute(
        &self,
        run_id: RunId,
        started_at: DateTime<Utc>,
        state: &mut RunState,
    ) -> Result<WorkflowRun> {
        let topic = self
            .stage(run_id, state, Stage::Topic, self.stages.generate_topic())
            .await?;
        let outline = self
            .stage(run_id, state, Stage::Outline, self.stages.write_outline(&topic))
            .await?;
        let revised_outline = self
            .stage(
                run_id,
                state,
                Stage::Evaluation,
                self.stages.evaluate_outline(&outline),
            )
            .await?;
        let blog_post = self
            .stage(
                run_id,
                state,
                Stage::Blog,
                self.stages.write_blog(&revised_outline),
            )
            .await?;

        self.transition(run_id, state, RunState::Appending);
        if let Err(e) = self.appender.append(&blog_post).await {
            self.queue_undelivered(run_id, &blog_post).await;
            return Err(e);
        }
        self.transition(run_id, state, RunState::Done);

        Ok(WorkflowRun {
            id: run_id,
            started_at,
            finished_at: Utc::now(),
            topic,
            outline,
            revised_outline,
            blog_post,
        })
    }

    async fn stage<F>(
        &self,
        run_id: RunId,
        state: &mut RunState,
        stage: Stage,
        call: F,
    ) -> Result<String>
    where
        F: Future<Output = Result<String>>,
    {
        self.transition(run_id, state, stage.state());
        let text = call.await?;
        self.events.emit(&RunEvent::StageCompleted {
            run_id,
            stage,
            preview: preview(&text, PREVIEW_CHARS).to_string(),
        });
        Ok(text)
    }

    fn transition(&self, run_id: RunId, state: &mut RunState, to: RunState) {
        debug_assert_eq!(state.next(), to, "out-of-order transition");
        *state = to;
        self.events.emit(&RunEvent::StateChanged { run_id, state: to });
    }

    // -----------------------------------------------------------------------
    // Outbox
    // -----------------------------------------------------------------------

    /// Deliver posts left over from earlier failed appends, oldest first.
    /// Stops at the first failure.
    async fn redeliver_pending(&self) {
        let Some(storage) = &self.storage else {
            return;
        };
        let pending = match storage.pending_posts().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "cannot read undelivered posts");
                return;
            }
        };

        for post in pending {
            match self.appender.append(&post.content).await {
                Ok(()) => {
                    if let Err(e) = storage.mark_delivered(&post.id).await {
                        warn!(post_id = %post.id, error = %e, "cannot mark post delivered");
                    }
                    self.events.emit(&RunEvent::Redelivered { post_id: post.id });
                }
                Err(e) => {
                    if let Err(e) = storage.record_delivery_attempt(&post.id).await {
                        warn!(post_id = %post.id, error = %e, "cannot record delivery attempt");
                    }
                    self.events.emit(&RunEvent::RedeliveryFailed {
                        post_id: post.id,
                        error: e.to_string(),
                    });
                    break;
                }
            }
        }
    }

    async fn queue_undelivered(&self, run_id: RunId, content: &str) {
        let Some(storage) = &self.storage else {
            return;
        };
        match storage.enqueue_undelivered(run_id, content).await {
            Ok(true) => self.events.emit(&RunEvent::PostQueued { run_id }),
            Ok(false) => {
                warn!(%run_id, "identical post already awaiting redelivery");
                self.events.emit(&RunEvent::PostQueued { run_id });
            }
            Err(e) => warn!(%run_id, error = %e, "cannot queue undelivered post"),
        }
    }

    // -----------------------------------------------------------------------
    // Ledger
    // -----------------------------------------------------------------------

    async fn ledger_start(&self, run_id: RunId, started_at: DateTime<Utc>) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.insert_run(run_id, started_at).await {
                warn!(%run_id, error = %e, "cannot record run start");
            }
        }
    }

    async fn ledger_finish(
        &self,
        run_id: RunId,
        state: RunState,
        error: Option<&str>,
        preview: Option<&str>,
    ) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.finish_run(run_id, state, error, preview).await {
                warn!(%run_id, error = %e, "cannot record run result");
            }
        }
    }
}

#[async_trait]
impl Job for WorkflowRunner {
    async fn run(&self) {
        self.run_once().await;
    }
}
