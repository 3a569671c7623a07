//! Application configuration for Blogsmith.
//!
//! User config lives at `~/.blogsmith/blogsmith.toml` unless `--config` points
//! elsewhere. Completion-service secrets are never stored in the file: the
//! config only names the environment variables that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BlogsmithError, Result};
use crate::retry::RetryPolicy;
use crate::types::GenerationParams;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "blogsmith.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".blogsmith";

// ---------------------------------------------------------------------------
// Config structs (matching blogsmith.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat-completion service settings.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Backoff applied to every external call.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Spreadsheet destination and OAuth files.
    #[serde(default)]
    pub sheets: SheetsConfig,

    /// Run cadence.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Run ledger / undelivered-post outbox.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Env var holding the endpoint URL.
    #[serde(default = "default_endpoint_env")]
    pub endpoint_env: String,

    /// Env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Env var holding the API version.
    #[serde(default = "default_api_version_env")]
    pub api_version_env: String,

    /// Model / deployment identifier.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint_env: default_endpoint_env(),
            api_key_env: default_api_key_env(),
            api_version_env: default_api_version_env(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl CompletionConfig {
    /// Generation parameters applied to every stage call.
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn default_endpoint_env() -> String {
    "AZURE_OPENAI_ENDPOINT".into()
}
fn default_api_key_env() -> String {
    "AZURE_OPENAI_API_KEY".into()
}
fn default_api_version_env() -> String {
    "AZURE_OPENAI_API_VERSION".into()
}
fn default_model() -> String {
    "gpt-4.1-nano".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_request_timeout() -> u64 {
    120
}

/// `[sheets]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    /// Spreadsheet key (the id in the spreadsheet URL). Required.
    #[serde(default)]
    pub spreadsheet_id: String,

    /// Worksheet (tab) name rows are appended to.
    #[serde(default = "default_worksheet")]
    pub worksheet: String,

    /// OAuth client-credentials JSON downloaded from the cloud console.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,

    /// Where the OAuth token is persisted between runs.
    #[serde(default = "default_token_file")]
    pub token_file: String,

    /// Loopback port for the interactive authorization redirect.
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,

    /// How long to wait for the browser redirect before giving up.
    #[serde(default = "default_authorize_timeout")]
    pub authorize_timeout_secs: u64,

    /// Sheets API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl SheetsConfig {
    pub fn authorize_timeout(&self) -> Duration {
        Duration::from_secs(self.authorize_timeout_secs)
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            worksheet: default_worksheet(),
            credentials_file: default_credentials_file(),
            token_file: default_token_file(),
            redirect_port: default_redirect_port(),
            authorize_timeout_secs: default_authorize_timeout(),
            api_base: default_api_base(),
        }
    }
}

fn default_worksheet() -> String {
    "blog".into()
}
fn default_credentials_file() -> String {
    "google_credentials.json".into()
}
fn default_token_file() -> String {
    "~/.blogsmith/token.json".into()
}
fn default_redirect_port() -> u16 {
    64576
}
fn default_authorize_timeout() -> u64 {
    300
}
fn default_api_base() -> String {
    "https://sheets.googleapis.com".into()
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Time between scheduled runs.
    #[serde(default = "default_period")]
    pub period_secs: u64,

    /// How often the loop checks for a due run.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl ScheduleConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_period() -> u64 {
    5 * 60 * 60
}
fn default_poll_interval() -> u64 {
    60
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Record runs and keep undelivered posts for redelivery.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// libSQL database file.
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: default_database(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_database() -> String {
    "~/.blogsmith/blogsmith.db".into()
}

// ---------------------------------------------------------------------------
// Completion credentials (runtime, resolved from the environment)
// ---------------------------------------------------------------------------

/// Endpoint, key and API version for the completion service.
#[derive(Clone)]
pub struct CompletionCredentials {
    pub endpoint: Url,
    pub api_key: String,
    pub api_version: String,
}

impl std::fmt::Debug for CompletionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionCredentials")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Read the completion credentials from the process environment.
pub fn resolve_completion_credentials(config: &AppConfig) -> Result<CompletionCredentials> {
    resolve_completion_credentials_with(config, |name| std::env::var(name).ok())
}

/// Resolve completion credentials through `lookup` (an env-var reader).
pub fn resolve_completion_credentials_with(
    config: &AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<CompletionCredentials> {
    let require = |var_name: &str| -> Result<String> {
        match lookup(var_name) {
            Some(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
            _ => Err(BlogsmithError::config(format!(
                "completion service not configured. Set the {var_name} environment variable."
            ))),
        }
    };

    let endpoint_raw = require(&config.completion.endpoint_env)?;
    let api_key = require(&config.completion.api_key_env)?;
    let api_version = require(&config.completion.api_version_env)?;

    let endpoint = Url::parse(&endpoint_raw).map_err(|e| {
        BlogsmithError::config(format!(
            "{} is not a valid URL ('{endpoint_raw}'): {e}",
            config.completion.endpoint_env
        ))
    })?;

    Ok(CompletionCredentials {
        endpoint,
        api_key,
        api_version,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check every value that can be checked without touching the network.
pub fn validate(config: &AppConfig) -> Result<()> {
    let sheets = &config.sheets;
    if sheets.spreadsheet_id.trim().is_empty() {
        return Err(BlogsmithError::config(
            "sheets.spreadsheet_id is empty. Set it in the config file.",
        ));
    }
    if sheets.worksheet.trim().is_empty() {
        return Err(BlogsmithError::config("sheets.worksheet is empty"));
    }
    Url::parse(&sheets.api_base).map_err(|e| {
        BlogsmithError::config(format!("sheets.api_base '{}' is invalid: {e}", sheets.api_base))
    })?;
    if sheets.authorize_timeout_secs == 0 {
        return Err(BlogsmithError::config(
            "sheets.authorize_timeout_secs must be positive",
        ));
    }

    let completion = &config.completion;
    if completion.model.trim().is_empty() {
        return Err(BlogsmithError::config("completion.model is empty"));
    }
    if !(0.0..=2.0).contains(&completion.temperature) {
        return Err(BlogsmithError::config(format!(
            "completion.temperature must be within 0.0..=2.0 (got {})",
            completion.temperature
        )));
    }
    if completion.max_tokens == 0 {
        return Err(BlogsmithError::config("completion.max_tokens must be positive"));
    }
    if completion.request_timeout_secs == 0 {
        return Err(BlogsmithError::config(
            "completion.request_timeout_secs must be positive",
        ));
    }

    if config.schedule.period_secs == 0 {
        return Err(BlogsmithError::config("schedule.period_secs must be positive"));
    }
    if config.schedule.poll_interval_secs == 0 {
        return Err(BlogsmithError::config(
            "schedule.poll_interval_secs must be positive",
        ));
    }

    Ok(())
}

/// Check that the spreadsheet service can be authorized: either a persisted
/// token or the client-credentials file must exist.
pub fn validate_sheets_credentials(config: &AppConfig) -> Result<()> {
    let token = expand_home(&config.sheets.token_file);
    let credentials = expand_home(&config.sheets.credentials_file);
    if token.exists() || credentials.exists() {
        return Ok(());
    }
    Err(BlogsmithError::config(format!(
        "no spreadsheet credentials: neither token file {} nor client credentials {} exists",
        token.display(),
        credentials.display()
    )))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.blogsmith/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BlogsmithError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.blogsmith/blogsmith.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BlogsmithError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        BlogsmithError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BlogsmithError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BlogsmithError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BlogsmithError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
