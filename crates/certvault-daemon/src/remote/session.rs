//! Session persistence.
//!
//! Keeps the backend session in a JSON file so an anonymous identity
//! survives restarts. Losing the file means a new anonymous user.

use std::path::{Path, PathBuf};

use super::client::RemoteError;
use super::types::RemoteSession;

/// JSON file holding the current session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session. A missing file is `None`.
    pub fn load(&self) -> Result<Option<RemoteSession>, RemoteError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        let session = serde_json::from_str(&data)
            .map_err(|e| RemoteError::Decode(format!("Failed to parse session file: {e}")))?;
        Ok(Some(session))
    }

    /// Write the session, readable by the owner only.
    pub fn save(&self, session: &RemoteSession) -> Result<(), RemoteError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| RemoteError::Decode(format!("Failed to serialize session: {e}")))?;
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Remove the stored session, if any.
    pub fn clear(&self) -> Result<(), RemoteError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
