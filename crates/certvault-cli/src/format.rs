//! Terminal output formatting helpers.

use std::io::{self, Write};
use std::path::Path;

use chrono::NaiveDate;

use certvault_core::{FileType, LocalCertificate};
use certvault_daemon::state::Statistics;

/// Characters of the id shown in listings. Commands accept any unique prefix.
pub const SHORT_ID_LEN: usize = 8;

pub fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

/// Guess the file type from an attachment's extension.
pub fn infer_file_type(path: &Path) -> FileType {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg" | "png" | "gif" | "webp" | "heic") => FileType::Image,
        _ => FileType::Pdf,
    }
}

fn expiry_note(days: i64) -> String {
    match days {
        d if d < 0 => format!("expired {} days ago", -d),
        0 => "expires today".to_string(),
        1 => "expires tomorrow".to_string(),
        d => format!("in {d} days"),
    }
}

pub fn write_table(
    w: &mut impl Write,
    certs: &[LocalCertificate],
    today: NaiveDate,
    notice_days: i64,
) -> io::Result<()> {
    if certs.is_empty() {
        writeln!(w, "No certificates")?;
        return Ok(());
    }
    writeln!(
        w,
        "{:<8}  {:<30}  {:<9}  {:<10}  {:<8}  {:<7}",
        "ID", "NAME", "CATEGORY", "EXPIRES", "STATUS", "SYNC"
    )?;
    for c in certs {
        let cert = &c.certificate;
        writeln!(
            w,
            "{:<8}  {:<30}  {:<9}  {:<10}  {:<8}  {:<7}",
            short_id(&cert.id),
            truncate(&cert.name, 30),
            cert.category.as_str(),
            cert.expiry_date,
            cert.current_status(today, notice_days).as_str(),
            c.sync_status.as_str()
        )?;
    }
    Ok(())
}

pub fn write_detail(
    w: &mut impl Write,
    c: &LocalCertificate,
    has_file: bool,
    today: NaiveDate,
    notice_days: i64,
) -> io::Result<()> {
    let cert = &c.certificate;
    writeln!(w, "  ID:       {}", cert.id)?;
    writeln!(w, "  Name:     {}", cert.name)?;
    writeln!(w, "  Serial:   {}", cert.serial_number)?;
    writeln!(w, "  Category: {}", cert.category)?;
    writeln!(w, "  Issued:   {}", cert.issue_date)?;
    writeln!(
        w,
        "  Expires:  {} ({})",
        cert.expiry_date,
        expiry_note(cert.days_until_expiry(today))
    )?;
    writeln!(w, "  Status:   {}", cert.current_status(today, notice_days))?;
    if has_file {
        writeln!(w, "  File:     {}", cert.file_type)?;
    } else {
        writeln!(w, "  File:     none")?;
    }
    writeln!(w, "  Sync:     {}", c.sync_status)?;
    writeln!(
        w,
        "  Updated:  {}",
        c.local_updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    Ok(())
}

pub fn write_statistics(w: &mut impl Write, stats: &Statistics) -> io::Result<()> {
    writeln!(w, "  Total:    {}", stats.total)?;
    writeln!(w, "  Valid:    {}", stats.valid)?;
    writeln!(w, "  Upcoming: {}", stats.upcoming)?;
    writeln!(w, "  Expired:  {}", stats.expired)?;
    Ok(())
}

pub fn write_expiring(
    w: &mut impl Write,
    certs: &[LocalCertificate],
    days: i64,
    today: NaiveDate,
) -> io::Result<()> {
    if certs.is_empty() {
        writeln!(w, "Nothing expires in the next {days} days")?;
        return Ok(());
    }
    for c in certs {
        let cert = &c.certificate;
        writeln!(
            w,
            "{:<8}  {:<30}  {}  {}",
            short_id(&cert.id),
            truncate(&cert.name, 30),
            cert.expiry_date,
            expiry_note(cert.days_until_expiry(today))
        )?;
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
