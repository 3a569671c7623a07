//! Azure OpenAI chat-completion client.
//!
//! Implements [`CompletionClient`] over the Azure deployment-scoped REST
//! endpoint (`{endpoint}/openai/deployments/{model}/chat/completions`),
//! authenticated with an `api-key` header and an `api-version` query parameter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use blogsmith_shared::{
    BlogsmithError, CompletionClient, CompletionCredentials, CompletionRequest, Result,
    RetryPolicy, ServiceKind, retry_with_backoff,
};

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("Blogsmith/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Build the message list; an empty system instruction sends no system role.
fn build_messages(request: &CompletionRequest) -> Vec<ChatMessage<'_>> {
    let mut messages = Vec::with_capacity(2);
    if !request.prompt.system_instruction.is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: &request.prompt.system_instruction,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.prompt.user_prompt,
    });
    messages
}

// ---------------------------------------------------------------------------
// AzureCompletionClient
// ---------------------------------------------------------------------------

/// Chat-completion client for an Azure OpenAI resource.
pub struct AzureCompletionClient {
    client: Client,
    credentials: CompletionCredentials,
    retry: RetryPolicy,
}

impl AzureCompletionClient {
    /// Create a client with the given request timeout and retry policy.
    pub fn new(
        credentials: CompletionCredentials,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                BlogsmithError::config(format!("failed to build completion HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            credentials,
            retry,
        })
    }

    /// `{endpoint}/openai/deployments/{model}/chat/completions?api-version=...`
    fn deployment_url(&self, model: &str) -> Result<Url> {
        let mut url = self.credentials.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                BlogsmithError::config(format!(
                    "completion endpoint cannot be a base URL: {}",
                    self.credentials.endpoint
                ))
            })?
            .pop_if_empty()
            .extend(["openai", "deployments", model, "chat", "completions"]);
        url.query_pairs_mut()
            .clear()
            .append_pair("api-version", &self.credentials.api_version);
        Ok(url)
    }

    async fn send_once(&self, url: &Url, body: &ChatRequest<'_>) -> Result<String> {
        let response = self
            .client
            .post(url.clone())
            .header("api-key", &self.credentials.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BlogsmithError::from_status(
                ServiceKind::Completion,
                status.as_u16(),
                &text,
            ));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            BlogsmithError::service(ServiceKind::Completion, format!("malformed response: {e}"))
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            BlogsmithError::service(ServiceKind::Completion, "response contained no choices")
        })?;

        match choice.message.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(BlogsmithError::service(
                ServiceKind::Completion,
                "first choice has no text content",
            )),
        }
    }
}

#[async_trait]
impl CompletionClient for AzureCompletionClient {
    #[instrument(skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        if request.prompt.user_prompt.trim().is_empty() {
            return Err(BlogsmithError::validation("completion prompt is empty"));
        }

        let url = self.deployment_url(&request.model)?;
        let body = ChatRequest {
            model: &request.model,
            messages: build_messages(request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let text = retry_with_backoff(&self.retry, "chat_completion", || {
            self.send_once(&url, &body)
        })
        .await?;

        debug!(chars = text.chars().count(), "completion received");
        Ok(text)
    }
}

/// Timeouts and connection failures are worth another attempt.
fn transport_error(e: reqwest::Error) -> BlogsmithError {
    let message = format!("request failed: {e}");
    if e.is_timeout() || e.is_connect() || e.is_request() {
        BlogsmithError::transient(ServiceKind::Completion, message)
    } else {
        BlogsmithError::service(ServiceKind::Completion, message)
    }
}
