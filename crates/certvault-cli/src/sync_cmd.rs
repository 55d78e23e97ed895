//! Backend subcommands: sync, status, logout.
//!
//! User-facing output uses writeln! to the given writer (stdout in the binary).

use std::io::Write;

use certvault_core::Config;
use certvault_daemon::bootstrap::supabase_client;
use certvault_daemon::state::CertificateState;
use certvault_daemon::sync::{SkipReason, SyncOutcome, SyncReport};

/// Backend subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum SyncAction {
    /// Run one sync pass now.
    Sync,
    /// Show pending uploads, conflicts and the last download point.
    Status,
    /// Sign out of the backend. Local data is kept.
    Logout,
}

/// Execute a backend subcommand.
pub async fn run(
    action: SyncAction,
    state: &CertificateState,
    config: &Config,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match action {
        SyncAction::Sync => sync(state, out).await,
        SyncAction::Status => status(state, config, out).await,
        SyncAction::Logout => logout(config, out).await,
    }
}

async fn sync(state: &CertificateState, out: &mut impl Write) -> anyhow::Result<()> {
    let orchestrator = state.orchestrator();
    if orchestrator.connect().await?.is_none() {
        writeln!(out, "Offline: no backend session, nothing synced")?;
        return Ok(());
    }

    match orchestrator.sync().await? {
        SyncOutcome::Completed(report) => {
            write_report(out, &report)?;
            state.load().await?;
            if report.has_failures() {
                anyhow::bail!("Sync finished with failures; pending records retry next time");
            }
        }
        SyncOutcome::Skipped(SkipReason::AlreadyRunning) => {
            writeln!(out, "A sync is already running")?;
        }
        SyncOutcome::Skipped(SkipReason::NoSession) => {
            writeln!(out, "Offline: no backend session, nothing synced")?;
        }
    }
    Ok(())
}

fn write_report(out: &mut impl Write, report: &SyncReport) -> std::io::Result<()> {
    writeln!(
        out,
        "Uploaded:   {} ({} failed)",
        report.uploaded, report.upload_failures
    )?;
    writeln!(
        out,
        "Downloaded: {} ({} failed, {} kept local, {} files)",
        report.downloaded, report.download_failures, report.kept_local, report.files_downloaded
    )?;
    if report.conflicts > 0 {
        writeln!(out, "Conflicts:  {}", report.conflicts)?;
    }
    Ok(())
}

async fn status(
    state: &CertificateState,
    config: &Config,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let store = state.orchestrator().store();
    let pending = store.get_pending_certificates().await?;
    let conflicts = store.count_conflicted().await?;
    let cursor = store.download_cursor().await?;

    let backend = if config.remote.is_configured() {
        config.remote.url.as_deref().unwrap_or_default()
    } else {
        "not configured"
    };
    writeln!(out, "  Backend:  {backend}")?;
    writeln!(out, "  Pending:  {}", pending.len())?;
    writeln!(out, "  Conflict: {conflicts}")?;
    match cursor {
        Some(at) => writeln!(out, "  Pulled:   {}", at.format("%Y-%m-%d %H:%M:%S UTC"))?,
        None => writeln!(out, "  Pulled:   never")?,
    }
    Ok(())
}

async fn logout(config: &Config, out: &mut impl Write) -> anyhow::Result<()> {
    let Some(client) = supabase_client(config)? else {
        writeln!(out, "No backend configured")?;
        return Ok(());
    };
    client.sign_out().await?;
    writeln!(out, "Signed out")?;
    Ok(())
}
