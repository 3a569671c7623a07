//! Interactive OAuth authorization (installed-app loopback flow).
//!
//! The user opens the printed consent URL in a browser; the provider redirects
//! to `http://localhost:{port}/?code=...`, where a one-shot listener captures
//! the code and exchanges it for tokens.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, instrument};
use url::Url;

use blogsmith_shared::{BlogsmithError, Result, ServiceKind};

use crate::token::{ClientSecrets, OAuthToken, SCOPES, request_token};

/// Obtains a brand-new token when nothing usable is stored.
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    async fn authorize(&self, secrets: &ClientSecrets) -> Result<OAuthToken>;
}

/// How long [`LoopbackFlow`] waits for the redirect unless told otherwise.
pub const DEFAULT_AUTHORIZE_TIMEOUT: Duration = Duration::from_secs(300);

/// Loopback-redirect flow on a fixed local port.
pub struct LoopbackFlow {
    client: Client,
    port: u16,
    wait: Duration,
}

impl LoopbackFlow {
    pub fn new(client: Client, port: u16) -> Self {
        Self {
            client,
            port,
            wait: DEFAULT_AUTHORIZE_TIMEOUT,
        }
    }

    /// Give up on the browser redirect after `wait`.
    pub fn with_timeout(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, secrets: &ClientSecrets, code: &str) -> Result<OAuthToken> {
        let redirect_uri = self.redirect_uri();
        let response = request_token(
            &self.client,
            &secrets.token_uri,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &secrets.client_id),
                ("client_secret", &secrets.client_secret),
                ("redirect_uri", &redirect_uri),
            ],
        )
        .await?;
        Ok(OAuthToken::from_response(response, secrets, None, Utc::now()))
    }
}

#[async_trait]
impl AuthorizationFlow for LoopbackFlow {
    #[instrument(skip_all, fields(port = self.port))]
    async fn authorize(&self, secrets: &ClientSecrets) -> Result<OAuthToken> {
        let listener = TcpListener::bind(("127.0.0.1", self.port))
            .await
            .map_err(|e| {
                BlogsmithError::service(
                    ServiceKind::Auth,
                    format!("cannot listen for OAuth redirect on port {}: {e}", self.port),
                )
            })?;

        let url = authorization_url(secrets, &self.redirect_uri())?;
        info!(%url, "waiting for spreadsheet authorization");
        eprintln!("Open this URL in a browser to authorize spreadsheet access:\n\n  {url}\n");

        let (mut stream, _) = tokio::time::timeout(self.wait, listener.accept())
            .await
            .map_err(|_| {
                BlogsmithError::service(
                    ServiceKind::Auth,
                    format!(
                        "no authorization redirect within {}s; run `blogsmith auth` to authorize",
                        self.wait.as_secs()
                    ),
                )
            })?
            .map_err(|e| {
                BlogsmithError::service(ServiceKind::Auth, format!("redirect accept failed: {e}"))
            })?;

        let mut buf = vec![0u8; 8192];
        let n = stream.read(&mut buf).await.map_err(|e| {
            BlogsmithError::service(ServiceKind::Auth, format!("redirect read failed: {e}"))
        })?;
        let request = String::from_utf8_lossy(&buf[..n]);
        let outcome = parse_redirect_request(&request);

        let body = match &outcome {
            Ok(_) => "Authorization complete. You may close this window.",
            Err(_) => "Authorization failed. Check the terminal for details.",
        };
        let reply = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(reply.as_bytes()).await;
        let _ = stream.shutdown().await;

        let code = outcome?;
        let token = self.exchange_code(secrets, &code).await?;
        info!("spreadsheet authorization granted");
        Ok(token)
    }
}

/// Consent-screen URL requesting offline access for [`SCOPES`].
pub fn authorization_url(secrets: &ClientSecrets, redirect_uri: &str) -> Result<Url> {
    let mut url = Url::parse(&secrets.auth_uri).map_err(|e| {
        BlogsmithError::config(format!("invalid auth_uri '{}': {e}", secrets.auth_uri))
    })?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &secrets.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &SCOPES.join(" "))
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent");
    Ok(url)
}

/// Extract the authorization code from the raw redirect HTTP request.
pub fn parse_redirect_request(request: &str) -> Result<String> {
    let target = request
        .lines()
        .next()
        .and_then(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("GET"), Some(target)) => Some(target),
                _ => None,
            }
        })
        .ok_or_else(|| {
            BlogsmithError::service(ServiceKind::Auth, "malformed OAuth redirect request")
        })?;

    let url = Url::parse(&format!("http://localhost{target}")).map_err(|e| {
        BlogsmithError::service(ServiceKind::Auth, format!("malformed redirect target: {e}"))
    })?;

    let mut code = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(BlogsmithError::service(
            ServiceKind::Auth,
            format!("authorization denied: {error}"),
        ));
    }
    code.filter(|c| !c.is_empty()).ok_or_else(|| {
        BlogsmithError::service(ServiceKind::Auth, "OAuth redirect carried no code")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn secrets(token_uri: &str) -> ClientSecrets {
        ClientSecrets::from_json(&format!(
            r#"{{ "web": {{ "client_id": "cid", "client_secret": "csecret", "token_uri": "{token_uri}" }} }}"#
        ))
        .unwrap()
    }

    #[test]
    fn authorization_url_contains_required_params() {
        let url = authorization_url(&secrets("https://t"), "http://localhost:64576/").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".into(), "cid".into())));
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("redirect_uri".into(), "http://localhost:64576/".into())));
        assert!(
            pairs
                .iter()
                .any(|(k, v)| k == "scope" && v.contains("auth/spreadsheets"))
        );
    }

    #[test]
    fn parse_redirect_extracts_code() {
        let request = "GET /?state=x&code=4%2F0Abc&scope=s HTTP/1.1\r\nHost: localhost\r\n\r\n";
        assert_eq!(parse_redirect_request(request).unwrap(), "4/0Abc");
    }

    #[test]
    fn parse_redirect_reports_denial() {
        let request = "GET /?error=access_denied HTTP/1.1\r\n\r\n";
        let err = parse_redirect_request(request).unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn parse_redirect_rejects_garbage() {
        assert!(parse_redirect_request("").is_err());
        assert!(parse_redirect_request("POST / HTTP/1.1").is_err());
        assert!(parse_redirect_request("GET /favicon.ico HTTP/1.1").is_err());
    }

    #[tokio::test]
    async fn authorize_gives_up_without_redirect() {
        // Port 0: any free port, nobody will connect.
        let flow = LoopbackFlow::new(Client::new(), 0).with_timeout(Duration::from_millis(100));

        let err = tokio::time::timeout(
            Duration::from_secs(3),
            flow.authorize(&secrets("https://t")),
        )
        .await
        .expect("authorize must return within its timeout")
        .unwrap_err();

        assert!(matches!(
            err,
            BlogsmithError::Service {
                service: ServiceKind::Auth,
                ..
            }
        ));
        assert!(err.to_string().contains("blogsmith auth"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn exchange_code_builds_refreshable_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "expires_in": 3599,
                "refresh_token": "1//refresh",
                "scope": "https://www.googleapis.com/auth/spreadsheets",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let flow = LoopbackFlow::new(Client::new(), 64576);
        let token = flow
            .exchange_code(&secrets(&format!("{}/token", server.uri())), "the-code")
            .await
            .unwrap();

        assert_eq!(token.access_token, "ya29.new");
        assert!(token.is_refreshable());
        assert!(token.is_valid());
        assert_eq!(token.client_id, "cid");
    }

    #[tokio::test]
    async fn exchange_code_surfaces_auth_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let flow = LoopbackFlow::new(Client::new(), 64576);
        let err = flow
            .exchange_code(&secrets(&format!("{}/token", server.uri())), "stale")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BlogsmithError::Service {
                service: ServiceKind::Auth,
                ..
            }
        ));
    }
}
