//! CertVault Daemon
//!
//! Keeps the local certificate store in step with the hosted backend,
//! running periodic sync passes until stopped.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{debug, info, warn};

use certvault_core::Config;
use certvault_core::config::load_config;
use certvault_daemon::bootstrap::open_orchestrator;
use certvault_daemon::state::CertificateState;

#[derive(Parser, Debug)]
#[command(name = "certvault-daemon")]
#[command(version, about = "CertVault daemon - encrypted certificate store with background sync")]
struct Args {
    /// Explicit settings file (JSON), layered over the global one
    #[arg(long, env = "CERTVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Database file path
    #[arg(long, env = "CERTVAULT_DB_PATH")]
    db_path: Option<PathBuf>,

    /// At-rest key file path
    #[arg(long, env = "CERTVAULT_KEY_PATH")]
    key_path: Option<PathBuf>,

    /// Supabase project URL
    #[arg(long, env = "CERTVAULT_SUPABASE_URL")]
    supabase_url: Option<String>,

    /// Supabase anon key
    #[arg(long, env = "CERTVAULT_SUPABASE_ANON_KEY", hide_env_values = true)]
    supabase_anon_key: Option<String>,

    /// Seconds between sync passes
    #[arg(long, env = "CERTVAULT_SYNC_INTERVAL_SECS")]
    sync_interval: Option<u64>,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long, env = "CERTVAULT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "CERTVAULT_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.db_path {
            config.storage.database_path = Some(path.clone());
        }
        if let Some(path) = &self.key_path {
            config.storage.key_path = Some(path.clone());
        }
        if let Some(url) = &self.supabase_url {
            config.remote.url = Some(url.clone());
        }
        if let Some(key) = &self.supabase_anon_key {
            config.remote.anon_key = Some(key.clone());
        }
        if let Some(secs) = self.sync_interval {
            config.sync.interval_secs = secs;
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);

    let log_filter = format!(
        "certvault_daemon={0},certvault_core={0}",
        config.log_level
    );
    certvault_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        remote = config.remote.is_configured(),
        interval_secs = config.sync.interval_secs,
        "Starting certvault-daemon"
    );

    let orchestrator = open_orchestrator(&config).await?;
    let state = Arc::new(CertificateState::new(Arc::clone(&orchestrator)));
    state.load().await?;
    report_expiring(&state, config.notifications.expiry_notice_days);

    let follower = state.follow_sync();
    let sync_handle = orchestrator.initialize().await?;

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    info!(online = sync_handle.is_some(), "Daemon ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    if let Some(handle) = sync_handle {
        handle.shutdown().await;
    }
    follower.abort();
    debug!(
        certificates = state.snapshot().certificates.len(),
        "Final certificate state"
    );

    info!("Daemon stopped");
    Ok(())
}

/// Log certificates that are expired or inside the notice window.
fn report_expiring(state: &CertificateState, notice_days: i64) {
    let today = Utc::now().date_naive();
    let stats = state.statistics(today);
    info!(
        total = stats.total,
        valid = stats.valid,
        upcoming = stats.upcoming,
        expired = stats.expired,
        "Certificate summary"
    );

    for cert in state.expiring_within(notice_days, today) {
        warn!(
            id = %cert.id(),
            name = %cert.certificate.name,
            expiry_date = %cert.certificate.expiry_date,
            days_remaining = cert.certificate.days_until_expiry(today),
            "Certificate expiring soon"
        );
    }
}
