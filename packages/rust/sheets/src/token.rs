//! OAuth token and client-secret types, plus the token-endpoint call shared by
//! code exchange and refresh.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use blogsmith_shared::{BlogsmithError, Result, ServiceKind};

/// Scopes requested for spreadsheet access.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

/// Tokens are treated as expired this long before their real expiry.
const EXPIRY_BUFFER_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// OAuthToken
// ---------------------------------------------------------------------------

/// A persisted OAuth credential, self-sufficient for refreshing.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// `None` means the token never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("expires_at", &self.expires_at)
            .field("refreshable", &self.refresh_token.is_some())
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl OAuthToken {
    /// Whether the access token can still be used at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(EXPIRY_BUFFER_SECS) < expires_at,
            None => true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Whether a refresh grant can be attempted.
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Build a token from a token-endpoint response.
    ///
    /// `previous_refresh` is kept when the response omits a refresh token
    /// (refresh grants usually do).
    pub fn from_response(
        response: TokenResponse,
        secrets: &ClientSecrets,
        previous_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let scopes = match response.scope {
            Some(scope) => scope.split_whitespace().map(String::from).collect(),
            None => SCOPES.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at: response.expires_in.map(|secs| now + Duration::seconds(secs)),
            token_uri: secrets.token_uri.clone(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            scopes,
        }
    }

    /// The client identity embedded in this token.
    pub fn client_secrets(&self) -> ClientSecrets {
        ClientSecrets {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            auth_uri: String::new(),
            token_uri: self.token_uri.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ClientSecrets
// ---------------------------------------------------------------------------

/// OAuth client identity from the cloud-console credentials file.
#[derive(Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".into()
}
fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

/// Credentials files wrap the client under `web` or `installed`.
#[derive(Deserialize)]
struct CredentialsFile {
    web: Option<ClientSecrets>,
    installed: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse a credentials JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| BlogsmithError::config(format!("invalid client credentials: {e}")))?;
        file.web.or(file.installed).ok_or_else(|| {
            BlogsmithError::config("client credentials must contain a `web` or `installed` section")
        })
    }

    /// Load a credentials file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BlogsmithError::io(path, e))?;
        Self::from_json(&content)
    }
}

// ---------------------------------------------------------------------------
// Token endpoint
// ---------------------------------------------------------------------------

/// Token endpoint response body.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// POST a form-encoded grant to `token_uri`.
pub async fn request_token(
    client: &Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    let response = client.post(token_uri).form(form).send().await.map_err(|e| {
        let message = format!("token request failed: {e}");
        if e.is_timeout() || e.is_connect() {
            BlogsmithError::transient(ServiceKind::Auth, message)
        } else {
            BlogsmithError::service(ServiceKind::Auth, message)
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(BlogsmithError::from_status(
            ServiceKind::Auth,
            status.as_u16(),
            &text,
        ));
    }

    response.json().await.map_err(|e| {
        BlogsmithError::service(ServiceKind::Auth, format!("malformed token response: {e}"))
    })
}

/// Token fixture for tests across the crate.
#[cfg(test)]
pub(crate) fn sample_token(expires_in_secs: Option<i64>, refresh: Option<&str>) -> OAuthToken {
    OAuthToken {
        access_token: "ya29.access".into(),
        refresh_token: refresh.map(String::from),
        expires_at: expires_in_secs.map(|s| Utc::now() + Duration::seconds(s)),
        token_uri: "https://oauth2.googleapis.com/token".into(),
        client_id: "client-1".into(),
        client_secret: "shh".into(),
        scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
    }
}
