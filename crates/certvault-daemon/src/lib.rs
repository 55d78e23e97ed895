//! CertVault Daemon Library
//!
//! Core functionality for the CertVault daemon:
//! - Encrypted SQLite store for certificates and their files
//! - Client for the hosted backend (auth, insert, fetch, delete)
//! - Sync orchestrator reconciling local and remote state
//! - In-memory application state for front-ends

pub mod bootstrap;
pub mod remote;
pub mod state;
pub mod storage;
pub mod sync;
