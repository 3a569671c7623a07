//! Shared types, error model, configuration, and service ports for Blogsmith.
//!
//! This crate is the foundation depended on by all other Blogsmith crates.
//! It provides:
//! - [`BlogsmithError`]: the unified error type
//! - Domain types ([`RunId`], [`Stage`], [`RunState`], [`WorkflowRun`], [`PromptPair`])
//! - Configuration ([`AppConfig`], config loading and validation)
//! - Service ports ([`CompletionClient`], [`SheetAppender`])
//! - Backoff for external calls ([`RetryPolicy`], [`retry_with_backoff`])

pub mod config;
pub mod error;
pub mod ports;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CompletionConfig, CompletionCredentials, ScheduleConfig, SheetsConfig,
    StorageConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, resolve_completion_credentials, resolve_completion_credentials_with,
    validate, validate_sheets_credentials,
};
pub use error::{BlogsmithError, Result, ServiceKind};
pub use ports::{CompletionClient, SheetAppender};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use types::{
    CompletionRequest, GenerationParams, PromptPair, RunId, RunState, Stage, WorkflowRun, preview,
};
