//! Certificate subcommands: add, edit, list, show, rm, export, stats, expiring.
//!
//! User-facing output uses writeln! to the given writer (stdout in the binary).

use std::io::Write;
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};

use certvault_core::model::parse_date;
use certvault_core::{Category, FileType, LocalCertificate};
use certvault_daemon::state::{CertificateState, CertificateUpdate, NewCertificate};
use certvault_daemon::sync::{SkipReason, SyncOutcome};

use crate::format;

/// Certificate subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum CertAction {
    /// Add a certificate, optionally with an attached scan.
    Add {
        /// Certificate name.
        name: String,
        /// Serial number printed on the certificate.
        #[arg(short, long, default_value = "")]
        serial: String,
        /// Category: STCW, GWO, OPITO, Contracts or Other.
        #[arg(short, long, default_value = "Other")]
        category: Category,
        /// Issue date (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date)]
        issued: NaiveDate,
        /// Expiry date (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date)]
        expires: NaiveDate,
        /// Attachment (PDF or image).
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Override the file type guessed from the extension.
        #[arg(long)]
        file_type: Option<FileType>,
    },
    /// Change fields of an existing certificate.
    Edit {
        /// Certificate id or unique prefix.
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        serial: Option<String>,
        #[arg(short, long)]
        category: Option<Category>,
        #[arg(long, value_parser = parse_date)]
        issued: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date)]
        expires: Option<NaiveDate>,
        /// Replace the attachment.
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(long)]
        file_type: Option<FileType>,
    },
    /// List certificates, soonest expiry first.
    List {
        /// Only show one category.
        #[arg(short, long)]
        category: Option<Category>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show one certificate.
    Show {
        /// Certificate id or unique prefix.
        id: String,
    },
    /// Delete a certificate locally and on the backend.
    Rm {
        /// Certificate id or unique prefix.
        id: String,
    },
    /// Write a certificate's attachment to a file.
    Export {
        /// Certificate id or unique prefix.
        id: String,
        /// Destination path.
        output: PathBuf,
    },
    /// Counts by status.
    Stats,
    /// Certificates expiring soon.
    Expiring {
        /// Window in days (defaults to the notice period).
        #[arg(short, long)]
        days: Option<i64>,
    },
}

impl CertAction {
    /// Whether the command writes to the backend and needs a session first.
    pub const fn needs_backend(&self) -> bool {
        matches!(self, Self::Add { .. } | Self::Edit { .. } | Self::Rm { .. })
    }
}

/// Execute a certificate subcommand against loaded state.
pub async fn run(
    action: CertAction,
    state: &CertificateState,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let today = Utc::now().date_naive();
    let notice_days = state.orchestrator().config().notice_days;

    match action {
        CertAction::Add {
            name,
            serial,
            category,
            issued,
            expires,
            file,
            file_type,
        } => {
            let data = read_attachment(file.as_ref()).await?;
            let file_type = file_type
                .or_else(|| file.as_deref().map(format::infer_file_type))
                .unwrap_or_default();
            let saved = state
                .add_certificate(
                    NewCertificate {
                        name,
                        serial_number: serial,
                        category,
                        issue_date: issued,
                        expiry_date: expires,
                        file_type,
                    },
                    data.as_deref(),
                )
                .await?;
            writeln!(out, "Added {}", saved.id())?;
            report_upload(state, out).await?;
        }
        CertAction::Edit {
            id,
            name,
            serial,
            category,
            issued,
            expires,
            file,
            file_type,
        } => {
            let id = resolve_id(state, &id)?;
            let data = read_attachment(file.as_ref()).await?;
            let file_type = file_type.or_else(|| file.as_deref().map(format::infer_file_type));
            let update = CertificateUpdate {
                name,
                serial_number: serial,
                category,
                issue_date: issued,
                expiry_date: expires,
                file_type,
            };
            let saved = state
                .update_certificate(&id, update, data.as_deref())
                .await?;
            writeln!(out, "Updated {}", saved.id())?;
            report_upload(state, out).await?;
        }
        CertAction::List { category, json } => {
            let certs = match category {
                Some(category) => state.certificates_by_category(category),
                None => state.snapshot().certificates,
            };
            if json {
                serde_json::to_writer_pretty(&mut *out, &certs)?;
                writeln!(out)?;
            } else {
                format::write_table(out, &certs, today, notice_days)?;
            }
        }
        CertAction::Show { id } => {
            let cert = find(state, &id)?;
            let has_file = state
                .orchestrator()
                .store()
                .has_certificate_file(cert.id())
                .await?;
            format::write_detail(out, &cert, has_file, today, notice_days)?;
        }
        CertAction::Rm { id } => {
            let id = resolve_id(state, &id)?;
            state.delete_certificate(&id).await?;
            writeln!(out, "Deleted {id}")?;
        }
        CertAction::Export { id, output } => {
            let id = resolve_id(state, &id)?;
            let data = state
                .orchestrator()
                .get_certificate_file(&id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Certificate {id} has no attached file"))?;
            tokio::fs::write(&output, &data).await?;
            writeln!(
                out,
                "Wrote {} bytes to {}",
                data.len(),
                output.display()
            )?;
        }
        CertAction::Stats => {
            format::write_statistics(out, &state.statistics(today))?;
        }
        CertAction::Expiring { days } => {
            let days = days.unwrap_or(notice_days);
            let certs = state.expiring_within(days, today);
            format::write_expiring(out, &certs, days, today)?;
        }
    }
    Ok(())
}

/// Wait for the upload started by a save so it is not lost when the process exits.
async fn report_upload(state: &CertificateState, out: &mut impl Write) -> anyhow::Result<()> {
    match state.orchestrator().finish_background_sync().await {
        Some(SyncOutcome::Completed(report)) if report.upload_failures > 0 => {
            writeln!(out, "Saved locally; upload failed and will be retried")?;
        }
        Some(SyncOutcome::Completed(_)) => writeln!(out, "Synced")?,
        Some(SyncOutcome::Skipped(SkipReason::AlreadyRunning)) => {
            writeln!(out, "Saved locally; another sync is running")?;
        }
        Some(SyncOutcome::Skipped(SkipReason::NoSession)) | None => {
            writeln!(out, "Saved locally; not synced")?;
        }
    }
    Ok(())
}

async fn read_attachment(path: Option<&PathBuf>) -> anyhow::Result<Option<Vec<u8>>> {
    match path {
        Some(path) => {
            let data = tokio::fs::read(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
            Ok(Some(data))
        }
        None => Ok(None),
    }
}

/// Resolve a full id or a unique prefix against the loaded certificates.
pub fn resolve_id(state: &CertificateState, prefix: &str) -> anyhow::Result<String> {
    find(state, prefix).map(|c| c.certificate.id)
}

fn find(state: &CertificateState, prefix: &str) -> anyhow::Result<LocalCertificate> {
    let snapshot = state.snapshot();
    if let Some(exact) = snapshot.get(prefix) {
        return Ok(exact.clone());
    }
    let mut matches = snapshot
        .certificates
        .into_iter()
        .filter(|c| c.id().starts_with(prefix));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Ok(only),
        (Some(_), Some(_)) => anyhow::bail!("Id prefix '{prefix}' is ambiguous"),
        (None, _) => anyhow::bail!("No certificate matches '{prefix}'"),
    }
}
