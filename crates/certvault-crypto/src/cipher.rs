//! Field and blob cipher for the local store.
//!
//! ChaCha20-Poly1305 AEAD with a fresh random nonce per message. The key is
//! shared by every process that opens the store.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::CryptoError;
use crate::key::LocalKey;

/// Nonce size for ChaCha20-Poly1305.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Encrypts strings and byte blobs into base64 text envelopes.
#[derive(Clone)]
pub struct LocalCipher {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for LocalCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCipher").finish_non_exhaustive()
    }
}

impl LocalCipher {
    pub fn new(key: &LocalKey) -> Self {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Encrypt a UTF-8 string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        self.seal(plaintext.as_bytes())
    }

    /// Decrypt a string produced by [`LocalCipher::encrypt`].
    ///
    /// Fails on a different key, tampering, or a non-UTF-8 payload.
    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        let bytes = self.open(envelope)?;
        String::from_utf8(bytes)
            .map_err(|_| CryptoError::DecryptionFailed("plaintext is not valid UTF-8".into()))
    }

    /// Encrypt a binary payload.
    pub fn encrypt_file(&self, data: &[u8]) -> Result<String, CryptoError> {
        self.seal(data)
    }

    /// Decrypt a payload produced by [`LocalCipher::encrypt_file`].
    pub fn decrypt_file(&self, envelope: &str) -> Result<Vec<u8>, CryptoError> {
        self.open(envelope)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut envelope = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(envelope))
    }

    fn open(&self, envelope: &str) -> Result<Vec<u8>, CryptoError> {
        let raw = STANDARD
            .decode(envelope)
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed(format!(
                "envelope too short: {} bytes",
                raw.len()
            )));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cipher() -> LocalCipher {
        LocalCipher::new(&LocalKey::from_bytes(&[42u8; 32]).unwrap())
    }

    #[test]
    fn string_roundtrip() {
        let c = cipher();
        for text in ["Fire Safety", "", "Überlebenstechniken 🚢", "BFF-2023-001"] {
            let sealed = c.encrypt(text).unwrap();
            assert_eq!(c.decrypt(&sealed).unwrap(), text);
        }
    }

    #[test]
    fn ciphertext_hides_plaintext() {
        let sealed = cipher().encrypt("Basic Fire Fighting").unwrap();
        assert!(!sealed.contains("Fire"));
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let c = cipher();
        assert_ne!(c.encrypt("x").unwrap(), c.encrypt("x").unwrap());
    }

    #[test]
    fn file_roundtrip_is_byte_exact() {
        let c = cipher();
        let data: Vec<u8> = (0..=255u8).cycle().take(1024 * 1024 + 3).collect();
        let sealed = c.encrypt_file(&data).unwrap();
        assert_eq!(c.decrypt_file(&sealed).unwrap(), data);
    }

    #[test]
    fn empty_file_roundtrip() {
        let c = cipher();
        let sealed = c.encrypt_file(&[]).unwrap();
        assert!(c.decrypt_file(&sealed).unwrap().is_empty());
    }

    #[test]
    fn decrypt_with_other_key_fails() {
        let sealed = cipher().encrypt("secret").unwrap();
        let other = LocalCipher::new(&LocalKey::generate());
        assert!(matches!(
            other.decrypt(&sealed),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn tampered_envelope_fails() {
        let c = cipher();
        let sealed = c.encrypt_file(b"payload").unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = STANDARD.encode(raw);
        assert!(c.decrypt_file(&tampered).is_err());
    }

    #[test]
    fn short_envelope_fails() {
        let c = cipher();
        let short = STANDARD.encode([0u8; NONCE_SIZE + TAG_SIZE - 1]);
        assert!(matches!(
            c.decrypt(&short),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn bad_base64_fails() {
        assert!(matches!(
            cipher().decrypt("not base64 !!"),
            Err(CryptoError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn binary_payload_is_not_accepted_as_string() {
        let c = cipher();
        let sealed = c.encrypt_file(&[0xFF, 0xFE, 0xFD]).unwrap();
        assert!(matches!(
            c.decrypt(&sealed),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }
}
