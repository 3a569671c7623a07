//! Service boundaries injected into the workflow runner.
//!
//! Concrete implementations live in `blogsmith-completion` and
//! `blogsmith-sheets`; tests substitute in-memory stubs.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::CompletionRequest;

/// A hosted chat-completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run one completion and return the first choice's text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Append-only sink for finished posts.
#[async_trait]
pub trait SheetAppender: Send + Sync {
    /// Append one row whose only cell is `text`.
    async fn append(&self, text: &str) -> Result<()>;
}
