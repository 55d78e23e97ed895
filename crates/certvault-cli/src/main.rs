//! `CertVault` CLI
//!
//! Manage the local certificate vault and trigger syncs from the terminal.

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use certvault_cli::cert_cmd::{self, CertAction};
use certvault_cli::sync_cmd::{self, SyncAction};
use certvault_core::config::load_config;
use certvault_daemon::bootstrap::open_orchestrator;
use certvault_daemon::state::CertificateState;

#[derive(Parser, Debug)]
#[command(name = "certvault")]
#[command(version, about = "Encrypted certificate vault", long_about = None)]
struct Cli {
    /// Explicit settings file (JSON), layered over the global one
    #[arg(long, global = true, env = "CERTVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Database file path
    #[arg(long, global = true, env = "CERTVAULT_DB_PATH")]
    db_path: Option<PathBuf>,

    /// At-rest key file path
    #[arg(long, global = true, env = "CERTVAULT_KEY_PATH")]
    key_path: Option<PathBuf>,

    /// Log level for diagnostics on stderr
    #[arg(long, global = true, env = "CERTVAULT_CLI_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Cert(CertAction),
    #[command(flatten)]
    Sync(SyncAction),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    certvault_core::tracing_init::init_tracing_stderr(&format!(
        "certvault_cli={0},certvault_daemon={0},certvault_core={0}",
        cli.log_level
    ));

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(path) = cli.db_path {
        config.storage.database_path = Some(path);
    }
    if let Some(path) = cli.key_path {
        config.storage.key_path = Some(path);
    }
    debug!(version = env!("CARGO_PKG_VERSION"), "Starting certvault CLI");

    let orchestrator = open_orchestrator(&config).await?;
    if let Command::Cert(action) = &cli.command {
        if action.needs_backend() && config.remote.is_configured() {
            orchestrator.connect().await?;
        }
    }
    let state = CertificateState::new(orchestrator);
    state.load().await?;

    let mut out = io::stdout().lock();
    match cli.command {
        Command::Cert(action) => cert_cmd::run(action, &state, &mut out).await,
        Command::Sync(action) => sync_cmd::run(action, &state, &config, &mut out).await,
    }
}
