//! `SQLite` storage for the CertVault daemon.
//!
//! `Database` holds the raw row queries; `LocalStore` layers field and blob
//! encryption on top and is what the rest of the daemon talks to.

mod db;
mod local_store;
mod models;
mod queries;

#[cfg(test)]
mod tests;

pub use db::{Database, DatabaseError, SCHEMA_VERSION};
pub use local_store::{LocalStore, StoreError, file_path_for};
pub use models::*;
