//! Access-token supply for the spreadsheet client.
//!
//! Resolution order on each call: cached token, stored token, refresh grant,
//! interactive authorization. Any newly obtained token is persisted.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use blogsmith_shared::{BlogsmithError, Result};

use crate::flow::AuthorizationFlow;
use crate::store::CredentialStore;
use crate::token::{ClientSecrets, OAuthToken, request_token};

pub struct Authenticator {
    client: Client,
    store: Arc<dyn CredentialStore>,
    flow: Arc<dyn AuthorizationFlow>,
    credentials_file: PathBuf,
    cached: Mutex<Option<OAuthToken>>,
}

impl Authenticator {
    pub fn new(
        client: Client,
        store: Arc<dyn CredentialStore>,
        flow: Arc<dyn AuthorizationFlow>,
        credentials_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            store,
            flow,
            credentials_file: credentials_file.into(),
            cached: Mutex::new(None),
        }
    }

    /// A bearer token valid for at least the expiry buffer.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.access_token.clone());
        }

        let current = match cached.take() {
            Some(token) => Some(token),
            None => self.store.load().await?,
        };

        let token = match current {
            Some(token) if token.is_valid() => {
                debug!("using stored spreadsheet token");
                token
            }
            Some(token) if token.is_refreshable() => match self.refresh(&token).await {
                Ok(refreshed) => {
                    self.store.save(&refreshed).await?;
                    refreshed
                }
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "token refresh rejected, re-authorizing");
                    self.authorize_and_store().await?
                }
            },
            _ => self.authorize_and_store().await?,
        };

        let access = token.access_token.clone();
        *cached = Some(token);
        Ok(access)
    }

    /// Run the interactive flow unconditionally and persist the result.
    pub async fn authorize_interactively(&self) -> Result<OAuthToken> {
        let token = self.authorize_and_store().await?;
        *self.cached.lock().await = Some(token.clone());
        Ok(token)
    }

    async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken> {
        let refresh_token = token.refresh_token.as_deref().unwrap_or_default();
        debug!("refreshing spreadsheet token");
        let response = request_token(
            &self.client,
            &token.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &token.client_id),
                ("client_secret", &token.client_secret),
            ],
        )
        .await?;
        info!("spreadsheet token refreshed");
        Ok(OAuthToken::from_response(
            response,
            &token.client_secrets(),
            token.refresh_token.clone(),
            Utc::now(),
        ))
    }

    async fn authorize_and_store(&self) -> Result<OAuthToken> {
        if !self.credentials_file.exists() {
            return Err(BlogsmithError::config(format!(
                "no usable spreadsheet token and client credentials file {} is missing",
                self.credentials_file.display()
            )));
        }
        let secrets = ClientSecrets::load(&self.credentials_file)?;
        let token = self.flow.authorize(&secrets).await?;
        self.store.save(&token).await?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use uuid::Uuid;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::flow::LoopbackFlow;
    use crate::store::MemoryCredentialStore;
    use crate::token::sample_token;

    /// Flow that hands out a fixed token and counts invocations.
    #[derive(Default)]
    struct FixedFlow {
        calls: AtomicU32,
    }

    #[async_trait]
    impl AuthorizationFlow for FixedFlow {
        async fn authorize(&self, secrets: &ClientSecrets) -> Result<OAuthToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut token = sample_token(Some(3600), Some("1//from-flow"));
            token.access_token = "from-flow".into();
            token.client_id = secrets.client_id.clone();
            Ok(token)
        }
    }

    fn credentials_file() -> PathBuf {
        let path = std::env::temp_dir().join(format!("bs_creds_{}.json", Uuid::now_v7()));
        std::fs::write(
            &path,
            r#"{ "web": { "client_id": "cid", "client_secret": "cs" } }"#,
        )
        .unwrap();
        path
    }

    fn missing_file() -> PathBuf {
        std::env::temp_dir().join(format!("bs_missing_{}.json", Uuid::now_v7()))
    }

    #[tokio::test]
    async fn valid_stored_token_is_used_without_network() {
        let store = Arc::new(MemoryCredentialStore::with_token(sample_token(
            Some(3600),
            None,
        )));
        let flow = Arc::new(FixedFlow::default());
        let auth = Authenticator::new(Client::new(), store, flow.clone(), missing_file());

        assert_eq!(auth.access_token().await.unwrap(), "ya29.access");
        assert_eq!(auth.access_token().await.unwrap(), "ya29.access");
        assert_eq!(flow.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=1%2F%2Fkeep"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "refreshed",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut expired = sample_token(Some(-100), Some("1//keep"));
        expired.token_uri = format!("{}/token", server.uri());
        let store = Arc::new(MemoryCredentialStore::with_token(expired));
        let flow = Arc::new(FixedFlow::default());
        let auth = Authenticator::new(Client::new(), store.clone(), flow.clone(), missing_file());

        assert_eq!(auth.access_token().await.unwrap(), "refreshed");

        let saved = store.snapshot().unwrap();
        assert_eq!(saved.access_token, "refreshed");
        assert_eq!(saved.refresh_token.as_deref(), Some("1//keep"));
        assert_eq!(flow.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_refresh_falls_back_to_interactive_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let mut expired = sample_token(Some(-100), Some("1//revoked"));
        expired.token_uri = format!("{}/token", server.uri());
        let store = Arc::new(MemoryCredentialStore::with_token(expired));
        let flow = Arc::new(FixedFlow::default());
        let auth = Authenticator::new(Client::new(), store.clone(), flow.clone(), credentials_file());

        assert_eq!(auth.access_token().await.unwrap(), "from-flow");
        assert_eq!(flow.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.snapshot().unwrap().access_token, "from-flow");
    }

    #[tokio::test]
    async fn rejected_refresh_without_redirect_fails_within_bound() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let mut expired = sample_token(Some(-100), Some("1//revoked"));
        expired.token_uri = format!("{}/token", server.uri());
        let store = Arc::new(MemoryCredentialStore::with_token(expired));
        let flow = Arc::new(
            LoopbackFlow::new(Client::new(), 0).with_timeout(Duration::from_millis(200)),
        );
        let auth = Authenticator::new(Client::new(), store, flow, credentials_file());

        let err = tokio::time::timeout(Duration::from_secs(3), auth.access_token())
            .await
            .expect("access_token must not wait forever for a browser")
            .unwrap_err();
        assert!(err.to_string().contains("blogsmith auth"));
    }

    #[tokio::test]
    async fn no_token_runs_flow_once() {
        let store = Arc::new(MemoryCredentialStore::new());
        let flow = Arc::new(FixedFlow::default());
        let auth = Authenticator::new(Client::new(), store.clone(), flow.clone(), credentials_file());

        assert_eq!(auth.access_token().await.unwrap(), "from-flow");
        assert_eq!(auth.access_token().await.unwrap(), "from-flow");
        assert_eq!(flow.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.snapshot().unwrap().client_id, "cid");
    }

    #[tokio::test]
    async fn missing_credentials_file_is_config_error() {
        let store = Arc::new(MemoryCredentialStore::new());
        let flow = Arc::new(FixedFlow::default());
        let auth = Authenticator::new(Client::new(), store, flow.clone(), missing_file());

        let err = auth.access_token().await.unwrap_err();
        assert!(err.is_config());
        assert_eq!(flow.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn authorize_interactively_replaces_valid_token() {
        let store = Arc::new(MemoryCredentialStore::with_token(sample_token(
            Some(3600),
            None,
        )));
        let flow = Arc::new(FixedFlow::default());
        let auth = Authenticator::new(Client::new(), store.clone(), flow.clone(), credentials_file());

        auth.authorize_interactively().await.unwrap();
        assert_eq!(auth.access_token().await.unwrap(), "from-flow");
        assert_eq!(store.snapshot().unwrap().access_token, "from-flow");
    }
}
