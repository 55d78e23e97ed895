//! Local encryption key management.
//!
//! One 256-bit key per installation, stored hex-encoded in a key file with
//! owner-only permissions.

use std::io::Write;
use std::path::Path;

use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Key size in bytes.
pub const KEY_SIZE: usize = 32;

/// Symmetric key for local at-rest encryption.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LocalKey {
    bytes: [u8; KEY_SIZE],
}

impl std::fmt::Debug for LocalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl LocalKey {
    /// Generate a new random key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Reconstruct from raw key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Raw key bytes. Handle with care.
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Save the key hex-encoded with restrictive permissions.
    pub fn save_to_file(&self, path: &Path) -> Result<(), CryptoError> {
        let dir = path.parent().ok_or_else(|| {
            CryptoError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no parent directory",
            ))
        })?;
        std::fs::create_dir_all(dir)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // Owner-only from creation
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;

        // An existing file keeps its old mode; tighten it before writing
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        let mut encoded = hex::encode(self.bytes);
        let written = file.write_all(encoded.as_bytes()).and_then(|()| file.sync_all());
        encoded.zeroize();
        written?;
        Ok(())
    }

    /// Load a key from a file written by [`LocalKey::save_to_file`].
    ///
    /// On Unix, refuses files readable by group or others.
    pub fn load_from_file(path: &Path) -> Result<Self, CryptoError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = std::fs::metadata(path)?;
            let mode = metadata.permissions().mode() & 0o777;
            if mode & 0o077 != 0 {
                return Err(CryptoError::IoError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("Key file has insecure permissions: {mode:o} (expected 600)"),
                )));
            }
        }

        let mut encoded = std::fs::read_to_string(path)?;
        let decoded = hex::decode(encoded.trim());
        encoded.zeroize();
        let mut bytes =
            decoded.map_err(|e| CryptoError::InvalidEncoding(format!("key file: {e}")))?;
        let result = Self::from_bytes(&bytes);
        bytes.zeroize();
        result
    }

    /// Load from file, or generate a new key and save it.
    ///
    /// Repeated calls against the same path return the same key.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            let key = Self::generate();
            key.save_to_file(path)?;
            Ok(key)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        assert_ne!(LocalKey::generate().as_bytes(), LocalKey::generate().as_bytes());
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        let err = LocalKey::from_bytes(&[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            }
        ));
    }

    #[test]
    fn load_or_generate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("vault.key");

        let first = LocalKey::load_or_generate(&path).unwrap();
        let second = LocalKey::load_or_generate(&path).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn key_file_is_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.key");
        let key = LocalKey::load_or_generate(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.len(), KEY_SIZE * 2);
        assert_eq!(hex::decode(contents).unwrap(), key.as_bytes());
    }

    #[test]
    fn corrupted_key_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.key");
        std::fs::write(&path, "zz-not-hex").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        }

        assert!(matches!(
            LocalKey::load_from_file(&path),
            Err(CryptoError::InvalidEncoding(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_key_file_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.key");
        LocalKey::generate().save_to_file(&path).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(matches!(
            LocalKey::load_from_file(&path),
            Err(CryptoError::IoError(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn new_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.key");
        LocalKey::load_or_generate(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn saving_over_loose_file_tightens_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.key");
        std::fs::write(&path, "stale contents that are longer than the key itself").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let key = LocalKey::generate();
        key.save_to_file(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(LocalKey::load_from_file(&path).unwrap().as_bytes(), key.as_bytes());
    }

    #[test]
    fn debug_redacts_key() {
        let key = LocalKey::from_bytes(&[7u8; KEY_SIZE]).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("07"));
    }
}
