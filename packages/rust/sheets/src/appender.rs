//! Google Sheets v4 appender.
//!
//! Each append first resolves the worksheet by title in the spreadsheet's
//! metadata, then adds one row whose only cell is the given text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};
use url::Url;

use blogsmith_shared::{
    BlogsmithError, Result, RetryPolicy, ServiceKind, SheetAppender, retry_with_backoff,
};

use crate::auth::Authenticator;

/// Request timeout for spreadsheet calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

/// Appends single-cell rows to one worksheet of one spreadsheet.
pub struct GoogleSheetAppender {
    client: Client,
    auth: Arc<Authenticator>,
    api_base: Url,
    spreadsheet_id: String,
    worksheet: String,
    retry: RetryPolicy,
}

impl GoogleSheetAppender {
    pub fn new(
        client: Client,
        auth: Arc<Authenticator>,
        api_base: Url,
        spreadsheet_id: impl Into<String>,
        worksheet: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            auth,
            api_base,
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: worksheet.into(),
            retry,
        }
    }

    /// `{api_base}/v4/spreadsheets/{id}` followed by `extra` segments.
    fn spreadsheet_url(&self, extra: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                BlogsmithError::config(format!(
                    "spreadsheet api_base cannot be a base URL: {}",
                    self.api_base
                ))
            })?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str()])
            .extend(extra);
        Ok(url)
    }

    async fn ensure_worksheet(&self, token: &str) -> Result<()> {
        let mut url = self.spreadsheet_url(&[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BlogsmithError::service(
                ServiceKind::Spreadsheet,
                format!("spreadsheet '{}' not found", self.spreadsheet_id),
            ));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BlogsmithError::from_status(
                ServiceKind::Spreadsheet,
                status.as_u16(),
                &text,
            ));
        }

        let meta: SpreadsheetMeta = response.json().await.map_err(|e| {
            BlogsmithError::service(
                ServiceKind::Spreadsheet,
                format!("malformed spreadsheet metadata: {e}"),
            )
        })?;

        if meta
            .sheets
            .iter()
            .any(|s| s.properties.title == self.worksheet)
        {
            Ok(())
        } else {
            Err(BlogsmithError::service(
                ServiceKind::Spreadsheet,
                format!(
                    "worksheet '{}' not found in spreadsheet '{}'",
                    self.worksheet, self.spreadsheet_id
                ),
            ))
        }
    }

    /// Token plus worksheet check. Read-only, so safe to repeat.
    async fn prepare(&self) -> Result<String> {
        let token = self.auth.access_token().await?;
        self.ensure_worksheet(&token).await?;
        Ok(token)
    }

    /// The append POST is not idempotent: only failures where the row
    /// cannot have been written are marked retryable.
    async fn post_row(&self, token: &str, text: &str) -> Result<()> {
        let range = format!("{}:append", sheet_range(&self.worksheet));
        let mut url = self.spreadsheet_url(&["values", range.as_str()])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "values": [[text]] }))
            .send()
            .await
            .map_err(append_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(append_status_error(status, &body));
        }
        Ok(())
    }
}

#[async_trait]
impl SheetAppender for GoogleSheetAppender {
    #[instrument(skip_all, fields(worksheet = %self.worksheet, chars = text.chars().count()))]
    async fn append(&self, text: &str) -> Result<()> {
        let token = retry_with_backoff(&self.retry, "sheet_prepare", || self.prepare()).await?;
        retry_with_backoff(&self.retry, "sheet_append", || self.post_row(&token, text)).await?;
        info!("row appended");
        Ok(())
    }
}

/// A1 range naming a whole worksheet; quotes in the title are doubled.
fn sheet_range(worksheet: &str) -> String {
    format!("'{}'", worksheet.replace('\'', "''"))
}

fn transport_error(e: reqwest::Error) -> BlogsmithError {
    let message = format!("request failed: {e}");
    debug!(error = %e, "spreadsheet transport error");
    if e.is_timeout() || e.is_connect() || e.is_request() {
        BlogsmithError::transient(ServiceKind::Spreadsheet, message)
    } else {
        BlogsmithError::service(ServiceKind::Spreadsheet, message)
    }
}

/// Only a failed connect guarantees the request body never left.
fn append_transport_error(e: reqwest::Error) -> BlogsmithError {
    debug!(error = %e, "spreadsheet append transport error");
    if e.is_connect() {
        BlogsmithError::transient(ServiceKind::Spreadsheet, format!("request failed: {e}"))
    } else {
        BlogsmithError::service(
            ServiceKind::Spreadsheet,
            format!("append outcome unknown, not retried: {e}"),
        )
    }
}

/// 429 rejects the request before any write; every other failure status
/// may follow a committed row.
fn append_status_error(status: StatusCode, body: &str) -> BlogsmithError {
    match BlogsmithError::from_status(ServiceKind::Spreadsheet, status.as_u16(), body) {
        BlogsmithError::Service {
            service, message, ..
        } => BlogsmithError::Service {
            service,
            message,
            retryable: status == StatusCode::TOO_MANY_REQUESTS,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::flow::AuthorizationFlow;
    use crate::store::MemoryCredentialStore;
    use crate::token::{ClientSecrets, OAuthToken, sample_token};

    struct NoFlow;

    #[async_trait]
    impl AuthorizationFlow for NoFlow {
        async fn authorize(&self, _secrets: &ClientSecrets) -> Result<OAuthToken> {
            Err(BlogsmithError::service(ServiceKind::Auth, "not in tests"))
        }
    }

    fn appender(server: &MockServer, worksheet: &str) -> GoogleSheetAppender {
        appender_with_client(server, worksheet, Client::new())
    }

    fn appender_with_client(
        server: &MockServer,
        worksheet: &str,
        client: Client,
    ) -> GoogleSheetAppender {
        let store = Arc::new(MemoryCredentialStore::with_token(sample_token(
            Some(3600),
            None,
        )));
        let auth = Arc::new(Authenticator::new(
            Client::new(),
            store,
            Arc::new(NoFlow),
            std::env::temp_dir().join("bs_unused_credentials.json"),
        ));
        GoogleSheetAppender::new(
            client,
            auth,
            Url::parse(&server.uri()).unwrap(),
            "sheet-1",
            worksheet,
            RetryPolicy {
                max_retries: 2,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
        )
    }

    async fn mount_metadata(server: &MockServer, titles: &[&str]) {
        let sheets: Vec<_> = titles
            .iter()
            .map(|t| json!({ "properties": { "title": t } }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .and(query_param("fields", "sheets.properties.title"))
            .and(header("authorization", "Bearer ya29.access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sheets": sheets })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn appends_single_cell_row() {
        let server = MockServer::start().await;
        mount_metadata(&server, &["Sheet1", "blog"]).await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.*blog.*:append$"))
            .and(query_param("valueInputOption", "RAW"))
            .and(query_param("insertDataOption", "INSERT_ROWS"))
            .and(header("authorization", "Bearer ya29.access"))
            .and(body_json(json!({ "values": [["X"]] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "spreadsheetId": "sheet-1",
                "updates": { "updatedRows": 1 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        appender(&server, "blog").append("X").await.expect("append");
    }

    #[tokio::test]
    async fn missing_worksheet_is_service_error_without_append() {
        let server = MockServer::start().await;
        mount_metadata(&server, &["Sheet1"]).await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = appender(&server, "blog").append("X").await.unwrap_err();
        assert!(err.to_string().contains("worksheet 'blog' not found"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn missing_spreadsheet_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = appender(&server, "blog").append("X").await.unwrap_err();
        assert!(matches!(
            err,
            BlogsmithError::Service {
                service: ServiceKind::Spreadsheet,
                ..
            }
        ));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn quota_error_is_retried_then_surfaced() {
        let server = MockServer::start().await;
        mount_metadata(&server, &["blog"]).await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .expect(3)
            .mount(&server)
            .await;

        let err = appender(&server, "blog").append("X").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_append_is_sent_once() {
        let server = MockServer::start().await;
        mount_metadata(&server, &["blog"]).await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let err = appender_with_client(&server, "blog", client)
            .append("X")
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("not retried"));
    }

    #[tokio::test]
    async fn server_error_on_append_is_not_retried() {
        let server = MockServer::start().await;
        mount_metadata(&server, &["blog"]).await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend error"))
            .expect(1)
            .mount(&server)
            .await;

        let err = appender(&server, "blog").append("X").await.unwrap_err();
        assert!(err.to_string().contains("HTTP 503"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn metadata_server_error_is_retried_before_appending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_metadata(&server, &["blog"]).await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        appender(&server, "blog").append("X").await.expect("append");
    }

    #[test]
    fn sheet_range_escapes_quotes() {
        assert_eq!(sheet_range("blog"), "'blog'");
        assert_eq!(sheet_range("Bob's posts"), "'Bob''s posts'");
    }
}
