//! `CertVault` Core Library
//!
//! Shared functionality for `CertVault` components:
//! - Certificate domain model (categories, status derivation, sync state)
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use model::{
    Category, Certificate, CertificateStatus, FileType, LocalCertificate, SyncStatus,
};
