//! Wiring shared by the daemon and the CLI.
//!
//! Resolves paths from `Config`, loads the at-rest key, opens the store and
//! picks a backend client.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use certvault_core::Config;
use certvault_crypto::{LocalCipher, LocalKey};

use crate::remote::{OfflineRemote, RemoteService, SessionStore, SupabaseClient};
use crate::storage::LocalStore;
use crate::sync::{SyncConfig, SyncOrchestrator};

/// Open the encrypted store, generating the key on first use.
pub async fn open_store(config: &Config) -> anyhow::Result<LocalStore> {
    let db_path = config
        .storage
        .database_path()
        .context("Cannot determine database path")?;
    let key_path = config
        .storage
        .key_path()
        .context("Cannot determine key path")?;

    let key = LocalKey::load_or_generate(&key_path)
        .with_context(|| format!("Failed to load key from {}", key_path.display()))?;
    info!(path = %db_path.display(), "Opening local store");
    let store = LocalStore::open(&db_path, LocalCipher::new(&key)).await?;
    Ok(store)
}

/// Supabase client, or `None` when no backend is configured.
pub fn supabase_client(config: &Config) -> anyhow::Result<Option<Arc<SupabaseClient>>> {
    if !config.remote.is_configured() {
        return Ok(None);
    }
    let sessions = config.storage.session_path().map(SessionStore::new);
    let client = SupabaseClient::new(&config.remote, sessions)?;
    Ok(Some(Arc::new(client)))
}

/// Build the orchestrator from configuration.
pub async fn open_orchestrator(config: &Config) -> anyhow::Result<Arc<SyncOrchestrator>> {
    let store = open_store(config).await?;
    let remote: Arc<dyn RemoteService> = match supabase_client(config)? {
        Some(client) => client,
        None => {
            info!("No remote backend configured, working offline");
            Arc::new(OfflineRemote)
        }
    };
    let sync_config =
        SyncConfig::from_settings(&config.sync, config.notifications.expiry_notice_days);
    Ok(Arc::new(SyncOrchestrator::new(store, remote, sync_config)))
}
