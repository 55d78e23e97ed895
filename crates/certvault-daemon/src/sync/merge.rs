//! Last-write-wins merge of downloaded certificates.

use chrono::{DateTime, Utc};

/// Merge outcome for one downloaded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Overwrite (or create) the local record with the remote one.
    AcceptRemote,
    /// The local record is strictly newer; leave it for the next upload.
    KeepLocal,
}

/// Compare the local edit time against the remote `client_updated_at`.
///
/// Ties go to the remote, whose copy already reflects that same edit.
pub fn resolve(local_updated_at: Option<DateTime<Utc>>, remote_updated_at: DateTime<Utc>) -> Resolution {
    match local_updated_at {
        Some(local) if local > remote_updated_at => Resolution::KeepLocal,
        _ => Resolution::AcceptRemote,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn newer_local_is_kept() {
        assert_eq!(
            resolve(Some(ts("2024-01-10T00:00:00Z")), ts("2024-01-05T00:00:00Z")),
            Resolution::KeepLocal
        );
    }

    #[test]
    fn newer_remote_is_accepted() {
        assert_eq!(
            resolve(Some(ts("2024-01-05T00:00:00Z")), ts("2024-01-10T00:00:00Z")),
            Resolution::AcceptRemote
        );
    }

    #[test]
    fn equal_timestamps_accept_remote() {
        let t = ts("2024-01-05T00:00:00Z");
        assert_eq!(resolve(Some(t), t), Resolution::AcceptRemote);
    }

    #[test]
    fn missing_local_accepts_remote() {
        assert_eq!(
            resolve(None, ts("2024-01-05T00:00:00Z")),
            Resolution::AcceptRemote
        );
    }

    #[test]
    fn offsets_are_normalised() {
        // 02:00+02:00 is midnight UTC, one second before the remote.
        assert_eq!(
            resolve(
                Some(ts("2024-01-05T02:00:00+02:00")),
                ts("2024-01-05T00:00:01Z")
            ),
            Resolution::AcceptRemote
        );
    }
}
