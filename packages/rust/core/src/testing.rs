//! Stub service implementations shared by the crate's tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use blogsmith_shared::{
    BlogsmithError, CompletionClient, CompletionRequest, Result, ServiceKind, SheetAppender,
};

/// Replies from a script (or one fixed reply) and records every request.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub(crate) fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub(crate) fn repeating(reply: &str) -> Self {
        Self {
            fallback: Some(reply.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.replies.lock().unwrap().pop_front();
        next.or_else(|| self.fallback.clone()).ok_or_else(|| {
            BlogsmithError::service(ServiceKind::Completion, "script exhausted")
        })
    }
}

/// Succeeds with `"out{n}"` except on call number `fail_at` (zero-based).
pub(crate) struct FailingClient {
    fail_at: u32,
    calls: AtomicU32,
}

impl FailingClient {
    pub(crate) fn at_call(fail_at: u32) -> Self {
        Self {
            fail_at,
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for FailingClient {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == self.fail_at {
            Err(BlogsmithError::service(
                ServiceKind::Completion,
                "HTTP 500: model unavailable",
            ))
        } else {
            Ok(format!("out{n}"))
        }
    }
}

/// Records appended rows; the first `failures` appends fail.
#[derive(Default)]
pub(crate) struct RecordingAppender {
    rows: Mutex<Vec<String>>,
    failures: AtomicU32,
    calls: AtomicU32,
}

impl RecordingAppender {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    pub(crate) fn rows(&self) -> Vec<String> {
        self.rows.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SheetAppender for RecordingAppender {
    async fn append(&self, text: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BlogsmithError::service(
                ServiceKind::Spreadsheet,
                "HTTP 429: quota exceeded",
            ));
        }
        self.rows.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
