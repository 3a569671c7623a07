//! Spreadsheet delivery for Blogsmith.
//!
//! - [`GoogleSheetAppender`] implements [`blogsmith_shared::SheetAppender`]
//!   against the Sheets v4 REST API.
//! - [`Authenticator`] supplies bearer tokens: stored, refreshed, or freshly
//!   authorized through an [`AuthorizationFlow`].
//! - [`CredentialStore`] abstracts where the token is persisted.

pub mod appender;
pub mod auth;
pub mod flow;
pub mod store;
pub mod token;

pub use appender::{GoogleSheetAppender, REQUEST_TIMEOUT};
pub use auth::Authenticator;
pub use flow::{AuthorizationFlow, LoopbackFlow, authorization_url, parse_redirect_request};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use token::{ClientSecrets, OAuthToken, SCOPES};
