//! `CertVault` CLI Library
//!
//! Command implementations for the `certvault` binary. Every command works
//! against the local encrypted store; `sync` and `logout` also talk to the
//! hosted backend when one is configured.

pub mod cert_cmd;
pub mod format;
pub mod sync_cmd;
