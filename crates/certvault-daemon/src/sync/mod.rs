//! Local/remote reconciliation.
//!
//! The orchestrator uploads pending local edits, merges remote changes with
//! last-write-wins on the client edit timestamp, and runs the periodic task.

pub mod config;
mod merge;
mod orchestrator;


pub use config::{RetryPolicy, SyncConfig};
pub use merge::{Resolution, resolve};
pub use orchestrator::{
    SkipReason, SyncError, SyncHandle, SyncOrchestrator, SyncOutcome, SyncReport,
};
