//! Hosted backend integration.
//!
//! Provides the [`RemoteService`] seam used by the sync orchestrator and a
//! reqwest-based Supabase implementation of it.

mod client;
mod service;
mod session;
pub mod types;

#[cfg(test)]
mod tests;

pub use client::{RemoteError, SupabaseClient};
pub use service::{OfflineRemote, RemoteService};
pub use session::SessionStore;
pub use types::{CertificateUpload, RemoteCertificate, RemoteSession};
