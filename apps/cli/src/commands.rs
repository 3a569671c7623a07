//! CLI command definitions, routing, and tracing setup.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::{info, warn};
use url::Url;

use blogsmith_completion::AzureCompletionClient;
use blogsmith_core::{RunOutcome, Scheduler, Stages, TokioClock, WorkflowRunner};
use blogsmith_sheets::{
    Authenticator, FileCredentialStore, GoogleSheetAppender, LoopbackFlow, REQUEST_TIMEOUT,
};
use blogsmith_shared::{
    AppConfig, config_file_path, expand_home, init_config, load_config, load_config_from,
    resolve_completion_credentials, validate, validate_sheets_credentials,
};
use blogsmith_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Blogsmith: scheduled blog generation into a spreadsheet.
#[derive(Parser)]
#[command(
    name = "blogsmith",
    version,
    about = "Generate a blog post through a chain of LLM prompts and append it to a spreadsheet, on a schedule.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.blogsmith/blogsmith.toml).
    #[arg(long, global = true, env = "BLOGSMITH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Defaults to `run`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug, PartialEq)]
pub(crate) enum Command {
    /// Run the workflow now, then on the configured schedule.
    Run {
        /// Run once and exit instead of scheduling.
        #[arg(long)]
        once: bool,
    },

    /// Authorize spreadsheet access interactively and store the token.
    Auth,

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show recent runs from the run database.
    History {
        /// Number of runs to show.
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug, PartialEq)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "blogsmith=info",
        1 => "blogsmith=debug",
        _ => "blogsmith=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let command = cli.command.unwrap_or(Command::Run { once: false });

    if let Command::Config {
        action: ConfigAction::Init,
    } = command
    {
        return cmd_config_init();
    }

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match command {
        Command::Run { once } => cmd_run(&config, once).await,
        Command::Auth => cmd_auth(&config).await,
        Command::History { limit } => cmd_history(&config, limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config, cli.config.as_deref()),
        },
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

fn build_authenticator(config: &AppConfig) -> Result<Arc<Authenticator>> {
    let http = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| eyre!("failed to build spreadsheet HTTP client: {e}"))?;
    let store = Arc::new(FileCredentialStore::new(expand_home(
        &config.sheets.token_file,
    )));
    let flow = Arc::new(
        LoopbackFlow::new(http.clone(), config.sheets.redirect_port)
            .with_timeout(config.sheets.authorize_timeout()),
    );
    Ok(Arc::new(Authenticator::new(
        http,
        store,
        flow,
        expand_home(&config.sheets.credentials_file),
    )))
}

fn build_appender(config: &AppConfig) -> Result<GoogleSheetAppender> {
    let http = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| eyre!("failed to build spreadsheet HTTP client: {e}"))?;
    let api_base = Url::parse(&config.sheets.api_base)
        .map_err(|e| eyre!("invalid sheets.api_base '{}': {e}", config.sheets.api_base))?;
    Ok(GoogleSheetAppender::new(
        http,
        build_authenticator(config)?,
        api_base,
        config.sheets.spreadsheet_id.clone(),
        config.sheets.worksheet.clone(),
        config.retry.clone(),
    ))
}

async fn build_runner(config: &AppConfig) -> Result<WorkflowRunner> {
    let credentials = resolve_completion_credentials(config)?;
    let completion = AzureCompletionClient::new(
        credentials,
        Duration::from_secs(config.completion.request_timeout_secs),
        config.retry.clone(),
    )?;
    let stages = Stages::new(Arc::new(completion), config.completion.generation_params());
    let mut runner = WorkflowRunner::new(stages, Arc::new(build_appender(config)?));

    if config.storage.enabled {
        let path = expand_home(&config.storage.database);
        let storage = Storage::open(&path).await?;
        info!(path = %path.display(), "run database opened");
        runner = runner.with_storage(Arc::new(storage));
    }
    Ok(runner)
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("interrupt received, shutting down");
}

/// One run, abandoned cleanly if `shutdown` resolves first.
async fn run_once_until<R, S>(run: R, shutdown: S) -> Result<()>
where
    R: Future<Output = RunOutcome>,
    S: Future<Output = ()>,
{
    let outcome = tokio::select! {
        _ = shutdown => return Ok(()),
        outcome = run => outcome,
    };
    match outcome.error {
        None => Ok(()),
        Some(e) => Err(eyre!("run {} failed: {e}", outcome.run_id)),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, once: bool) -> Result<()> {
    validate(config)?;
    validate_sheets_credentials(config)?;
    let runner = build_runner(config).await?;

    if once {
        return run_once_until(runner.run_once(), shutdown_signal()).await;
    }

    let mut scheduler = Scheduler::new(
        Arc::new(runner),
        Arc::new(TokioClock::new()),
        config.schedule.period(),
        config.schedule.poll_interval(),
    );
    scheduler.run_until(shutdown_signal()).await;
    Ok(())
}

async fn cmd_auth(config: &AppConfig) -> Result<()> {
    let credentials = expand_home(&config.sheets.credentials_file);
    if !credentials.exists() {
        return Err(eyre!(
            "client credentials file {} not found",
            credentials.display()
        ));
    }

    let auth = build_authenticator(config)?;
    auth.authorize_interactively().await?;
    println!(
        "Spreadsheet authorization stored at {}",
        expand_home(&config.sheets.token_file).display()
    );
    Ok(())
}

async fn cmd_history(config: &AppConfig, limit: usize) -> Result<()> {
    if !config.storage.enabled {
        println!("Run history is disabled ([storage] enabled = false).");
        return Ok(());
    }

    let storage = Storage::open_readonly(&expand_home(&config.storage.database)).await?;
    let runs = storage.list_runs(limit).await?;
    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    for run in runs {
        let detail = run
            .error
            .as_deref()
            .or(run.preview.as_deref())
            .unwrap_or("")
            .replace('\n', " ");
        println!(
            "{}  {}  {:<8}  {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.id,
            run.state.as_str(),
            blogsmith_shared::preview(&detail, 60)
        );
    }

    let pending = storage.pending_posts().await?;
    if !pending.is_empty() {
        println!("\n{} post(s) awaiting redelivery.", pending.len());
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig, explicit: Option<&Path>) -> Result<()> {
    match explicit {
        Some(path) => println!("# {}", path.display()),
        None => {
            if let Ok(path) = config_file_path() {
                println!("# {}", path.display());
            }
        }
    }
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
