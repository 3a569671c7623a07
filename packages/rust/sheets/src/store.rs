//! Credential stores: where the spreadsheet OAuth token lives between runs.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};

use blogsmith_shared::{BlogsmithError, Result};

use crate::token::OAuthToken;

/// Read/write access to a persisted OAuth token.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the stored token, if any.
    async fn load(&self) -> Result<Option<OAuthToken>>;
    /// Persist `token`, replacing whatever was stored.
    async fn save(&self, token: &OAuthToken) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FileCredentialStore
// ---------------------------------------------------------------------------

/// JSON token file on local disk, written with owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<OAuthToken>> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored token");
                return Ok(None);
            }
            Err(e) => return Err(BlogsmithError::io(&self.path, e)),
        };

        match serde_json::from_str::<OAuthToken>(&data) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                // A corrupt token file is recoverable through re-authorization.
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable token file");
                Ok(None)
            }
        }
    }

    async fn save(&self, token: &OAuthToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BlogsmithError::io(parent, e))?;
            }
        }

        let json = serde_json::to_string_pretty(token)
            .map_err(|e| BlogsmithError::validation(format!("failed to encode token: {e}")))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| BlogsmithError::io(&self.path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = tokio::fs::set_permissions(&self.path, perms).await;
        }

        debug!(path = %self.path.display(), "token persisted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryCredentialStore
// ---------------------------------------------------------------------------

/// In-process store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<OAuthToken>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `token` already stored.
    pub fn with_token(token: OAuthToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }

    /// Current contents (for inspection).
    pub fn snapshot(&self) -> Option<OAuthToken> {
        self.token.lock().map(|t| t.clone()).unwrap_or(None)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<OAuthToken>> {
        Ok(self.snapshot())
    }

    async fn save(&self, token: &OAuthToken) -> Result<()> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| BlogsmithError::Storage("credential store lock poisoned".into()))?;
        *guard = Some(token.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::sample_token;
    use uuid::Uuid;

    fn temp_token_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("bs_token_{}", Uuid::now_v7()))
            .join("token.json")
    }

    #[tokio::test]
    async fn file_store_missing_file_is_none() {
        let store = FileCredentialStore::new(temp_token_path());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_roundtrip_creates_parent_dirs() {
        let path = temp_token_path();
        let store = FileCredentialStore::new(&path);
        let token = sample_token(Some(3600), Some("1//refresh"));

        store.save(&token).await.expect("save");
        assert!(path.exists());

        let loaded = store.load().await.expect("load").expect("token present");
        assert_eq!(loaded, token);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_token_path();
        let store = FileCredentialStore::new(&path);
        store.save(&sample_token(None, None)).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn corrupt_file_is_treated_as_missing() {
        let path = temp_token_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_replaces_token() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().await.unwrap().is_none());

        let first = sample_token(Some(10), None);
        store.save(&first).await.unwrap();
        let mut second = sample_token(Some(3600), None);
        second.access_token = "second".into();
        store.save(&second).await.unwrap();

        assert_eq!(store.load().await.unwrap().unwrap().access_token, "second");
    }
}
