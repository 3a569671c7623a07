//! Fixed-period scheduler: run immediately, then every `period`, checking for
//! a due run once per `poll_interval`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

/// Work the scheduler triggers. Failures are the job's own business.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self);
}

/// Time source for the scheduler.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time via tokio.
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct Scheduler {
    job: Arc<dyn Job>,
    clock: Arc<dyn Clock>,
    period: Duration,
    poll_interval: Duration,
    next_due: Option<Duration>,
    runs: u64,
}

impl Scheduler {
    pub fn new(
        job: Arc<dyn Job>,
        clock: Arc<dyn Clock>,
        period: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            job,
            clock,
            period,
            poll_interval,
            next_due: None,
            runs: 0,
        }
    }

    /// Number of runs triggered so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Run the job unconditionally and schedule the next run.
    pub async fn start(&mut self) {
        info!(
            period_secs = self.period.as_secs(),
            poll_secs = self.poll_interval.as_secs(),
            "scheduler started"
        );
        self.trigger().await;
    }

    /// Wait one poll interval, then run the job if it is due.
    /// Returns whether it ran.
    pub async fn poll_once(&mut self) -> bool {
        self.clock.sleep(self.poll_interval).await;
        match self.next_due {
            Some(due) if self.clock.now() < due => false,
            _ => {
                self.trigger().await;
                true
            }
        }
    }

    /// Start and poll until `shutdown` resolves, which may interrupt a run.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {}
            _ = self.run_forever() => {}
        }
        info!(runs = self.runs, "scheduler stopped");
    }

    async fn run_forever(&mut self) {
        self.start().await;
        loop {
            self.poll_once().await;
        }
    }

    async fn trigger(&mut self) {
        self.runs += 1;
        self.job.run().await;
        let due = self.clock.now() + self.period;
        self.next_due = Some(due);
        debug!(next_due_secs = due.as_secs(), "next run scheduled");
    }
}
