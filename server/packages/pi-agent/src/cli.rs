use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use pi_agent_credentials::CredentialResolver;
use pi_agent_universal_schema::ModelConfig;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::llm::providers::{ProviderEndpoints, Timeouts};
use crate::llm::Orchestrator;
use crate::router::{build_router, AppState};
use crate::session_store::{SessionStore, DEFAULT_SESSIONS_DIR};
use crate::terminal::TerminalRegistry;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;

#[derive(Parser, Debug)]
#[command(name = "pi-agent", bin_name = "pi-agent")]
#[command(about = "Editor agent server", version)]
#[command(arg_required_else_help = true)]
pub struct PiAgentCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the agent HTTP server.
    Server(ServerArgs),
    /// Inspect stored sessions without starting the server.
    Sessions(SessionsArgs),
    /// Inspect the resolved model configuration.
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    #[arg(long, short = 'H', default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, short = 'p', default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value = DEFAULT_SESSIONS_DIR)]
    sessions_dir: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not fall back to *_API_KEY environment variables.
    #[arg(long)]
    no_env_keys: bool,

    #[arg(long, default_value_t = 10_000)]
    connect_timeout_ms: u64,

    #[arg(long, default_value_t = 120_000)]
    request_timeout_ms: u64,

    #[arg(long, default_value_t = 60_000)]
    idle_timeout_ms: u64,

    #[arg(long, default_value_t = 600)]
    terminal_ttl_secs: u64,

    /// Kill approved terminal commands after this many seconds.
    #[arg(long, default_value_t = 120)]
    terminal_timeout_secs: u64,
}

#[derive(Args, Debug)]
pub struct SessionsArgs {
    #[command(subcommand)]
    command: SessionsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SessionsCommand {
    /// List sessions, most recent first.
    List(SessionsDirArgs),
    /// Print one session.
    Show(ShowSessionArgs),
}

#[derive(Args, Debug)]
pub struct SessionsDirArgs {
    #[arg(long, default_value = DEFAULT_SESSIONS_DIR)]
    sessions_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct ShowSessionArgs {
    session_id: String,

    #[arg(long, default_value = DEFAULT_SESSIONS_DIR)]
    sessions_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the default model with its key redacted.
    Show(ConfigShowArgs),
}

#[derive(Args, Debug)]
pub struct ConfigShowArgs {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    no_env_keys: bool,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server error: {0}")]
    Server(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

pub fn run_pi_agent() -> Result<(), CliError> {
    let cli = PiAgentCli::parse();
    if let Err(err) = init_logging() {
        eprintln!("failed to init logging: {err}");
        return Err(err);
    }
    run_command(&cli.command)
}

pub fn init_logging() -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_logfmt::builder()
                .layer()
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|err| CliError::Server(err.to_string()))
}

pub fn run_command(command: &Command) -> Result<(), CliError> {
    match command {
        Command::Server(args) => run_server(args),
        Command::Sessions(subcommand) => run_sessions(&subcommand.command),
        Command::Config(subcommand) => run_config(&subcommand.command),
    }
}

fn credential_resolver(config: Option<&PathBuf>, no_env_keys: bool) -> CredentialResolver {
    let resolver = match config {
        Some(path) => CredentialResolver::new(path),
        None => CredentialResolver::default_location(),
    };
    if no_env_keys {
        resolver.without_env()
    } else {
        resolver
    }
}

fn run_server(server: &ServerArgs) -> Result<(), CliError> {
    let timeouts = Timeouts {
        connect: Duration::from_millis(server.connect_timeout_ms),
        request: Duration::from_millis(server.request_timeout_ms),
        idle: Duration::from_millis(server.idle_timeout_ms),
    };
    let llm = Orchestrator::new(ProviderEndpoints::default(), timeouts)
        .map_err(|err| CliError::Server(err.to_string()))?;
    let credentials = credential_resolver(server.config.as_ref(), server.no_env_keys);
    let state = AppState::new(
        credentials,
        SessionStore::new(&server.sessions_dir),
        llm,
        TerminalRegistry::new(Duration::from_secs(server.terminal_ttl_secs))
            .with_exec_timeout(Duration::from_secs(server.terminal_timeout_secs)),
    );
    let router = build_router(state);

    let addr = format!("{}:{}", server.host, server.port);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Server(err.to_string()))?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(
            addr = %addr,
            sessions_dir = %server.sessions_dir.display(),
            "server listening"
        );
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutting down");
            })
            .await
            .map_err(|err| CliError::Server(err.to_string()))
    })
}

fn run_sessions(command: &SessionsCommand) -> Result<(), CliError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Server(err.to_string()))?;

    match command {
        SessionsCommand::List(args) => {
            let store = SessionStore::new(&args.sessions_dir);
            let sessions = runtime
                .block_on(store.list())
                .map_err(|err| CliError::Server(err.to_string()))?;
            write_json(&sessions)
        }
        SessionsCommand::Show(args) => {
            let store = SessionStore::new(&args.sessions_dir);
            let session = runtime
                .block_on(store.load(&args.session_id))
                .ok_or_else(|| CliError::SessionNotFound(args.session_id.clone()))?;
            write_json(&session)
        }
    }
}

fn run_config(command: &ConfigCommand) -> Result<(), CliError> {
    match command {
        ConfigCommand::Show(args) => {
            let resolver = credential_resolver(args.config.as_ref(), args.no_env_keys);
            let model = redacted(resolver.resolve(None));
            write_json(&ConfigOutput {
                config_path: resolver.config_path().display().to_string(),
                default_model: model,
            })
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigOutput {
    config_path: String,
    default_model: ModelConfig,
}

fn redacted(mut model: ModelConfig) -> ModelConfig {
    model.api_key = model.api_key.as_deref().map(redact_key);
    model
}

fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}...{suffix}")
}

fn write_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let pretty = serde_json::to_string_pretty(value)?;
    let mut out = std::io::stdout();
    out.write_all(pretty.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
