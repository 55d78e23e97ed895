//! `CertVault` at-rest encryption
//!
//! Symmetric encryption of certificate fields and file blobs kept in the
//! local store.
//!
//! ## Crypto primitives
//!
//! - **Key**: 256-bit random key, generated once and persisted hex-encoded in
//!   a key file next to the database
//! - **Encryption**: ChaCha20-Poly1305 AEAD, random 12-byte nonce per message,
//!   envelope `base64(nonce || ciphertext || tag)`
//!
//! ## Limitation
//!
//! The key lives beside the data it protects. Anyone who can read the data
//! directory can read the key, so this guards exported or copied database
//! files against casual inspection only. Real confidentiality needs key
//! material from an external secret store or a user credential.

pub mod cipher;
pub mod error;
pub mod key;

pub use cipher::{LocalCipher, NONCE_SIZE, TAG_SIZE};
pub use error::CryptoError;
pub use key::{KEY_SIZE, LocalKey};
