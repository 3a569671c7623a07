//! Error types for Blogsmith.
//!
//! Library crates use [`BlogsmithError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

/// External service a [`BlogsmithError::Service`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// The hosted chat-completion endpoint.
    Completion,
    /// The spreadsheet API.
    Spreadsheet,
    /// The OAuth authorization / token endpoints.
    Auth,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Completion => "completion",
            Self::Spreadsheet => "spreadsheet",
            Self::Auth => "auth",
        };
        f.write_str(name)
    }
}

/// Top-level error type for all Blogsmith operations.
#[derive(Debug, thiserror::Error)]
pub enum BlogsmithError {
    /// Missing or invalid configuration, detected at startup.
    #[error("config error: {message}")]
    Config { message: String },

    /// Failure of an external service call (network, status, auth, malformed response).
    #[error("{service} service error: {message}")]
    Service {
        service: ServiceKind,
        message: String,
        /// Whether repeating the same call may succeed (timeouts, 429, 5xx).
        retryable: bool,
    },

    /// Run ledger / outbox database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid input to an operation.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BlogsmithError>;

impl BlogsmithError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a non-retryable service error.
    pub fn service(service: ServiceKind, msg: impl Into<String>) -> Self {
        Self::Service {
            service,
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a service error that is safe to retry.
    pub fn transient(service: ServiceKind, msg: impl Into<String>) -> Self {
        Self::Service {
            service,
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map an HTTP status from `service` to an error, flagging 408/429/5xx as retryable.
    pub fn from_status(service: ServiceKind, status: u16, body: &str) -> Self {
        let retryable = status == 408 || status == 429 || (500..600).contains(&status);
        let snippet = &body[..floor_char_boundary(body, 300)];
        Self::Service {
            service,
            message: format!("HTTP {status}: {snippet}"),
            retryable,
        }
    }

    /// Whether the failed operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Service { retryable: true, .. })
    }

    /// Whether this is a startup configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = BlogsmithError::config("missing spreadsheet id");
        assert_eq!(err.to_string(), "config error: missing spreadsheet id");

        let err = BlogsmithError::service(ServiceKind::Completion, "no choices returned");
        assert_eq!(
            err.to_string(),
            "completion service error: no choices returned"
        );
    }

    #[test]
    fn status_classification() {
        assert!(BlogsmithError::from_status(ServiceKind::Spreadsheet, 429, "").is_retryable());
        assert!(BlogsmithError::from_status(ServiceKind::Spreadsheet, 503, "").is_retryable());
        assert!(!BlogsmithError::from_status(ServiceKind::Spreadsheet, 404, "").is_retryable());
        assert!(!BlogsmithError::from_status(ServiceKind::Auth, 401, "").is_retryable());
    }

    #[test]
    fn status_body_is_truncated() {
        let body = "é".repeat(400);
        let err = BlogsmithError::from_status(ServiceKind::Completion, 500, &body);
        assert!(err.to_string().len() < 400);
    }

    #[test]
    fn only_service_errors_retry() {
        assert!(BlogsmithError::transient(ServiceKind::Auth, "timeout").is_retryable());
        assert!(!BlogsmithError::validation("empty prompt").is_retryable());
        assert!(BlogsmithError::config("x").is_config());
    }
}
