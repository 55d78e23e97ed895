//! Supabase REST client.
//!
//! Uses reqwest against the `GoTrue` auth endpoints and the `PostgREST`
//! data endpoints of a Supabase project.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use certvault_core::config::RemoteConfig;

use super::service::RemoteService;
use super::session::SessionStore;
use super::types::{
    AuthUser, CertificateUpload, FileRequest, RemoteCertificate, RemoteSession, TokenResponse,
    format_timestamp,
};

/// Seconds before expiry at which an access token is refreshed.
const REFRESH_LEEWAY_SECS: i64 = 60;

/// Remote service errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// The server rejected the request itself (4xx) rather than failing.
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status >= 400 && *status < 500)
    }
}

#[derive(Debug, Default)]
struct SessionState {
    current: Option<RemoteSession>,
    /// Whether the stored session file has been read.
    loaded: bool,
    /// Whether `current` has been checked against the server in this process.
    validated: bool,
}

/// Client for a Supabase project.
#[derive(Debug)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: Mutex<SessionState>,
    store: Option<SessionStore>,
}

impl SupabaseClient {
    /// Create a client. `store` persists the session between runs.
    pub fn new(config: &RemoteConfig, store: Option<SessionStore>) -> Result<Self, RemoteError> {
        let url = config.url.as_deref().unwrap_or_default();
        if url.is_empty() {
            return Err(RemoteError::Config("remote url is empty".into()));
        }
        let anon_key = config.anon_key.as_deref().unwrap_or_default();
        if anon_key.is_empty() {
            return Err(RemoteError::Config("anon key is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let key_val = HeaderValue::from_str(anon_key)
            .map_err(|_| RemoteError::Config("Invalid anon key format".into()))?;
        headers.insert("apikey", key_val);

        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let base_url = url.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            anon_key: anon_key.to_string(),
            session: Mutex::new(SessionState::default()),
            store,
        })
    }

    pub(crate) fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    pub(crate) fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1{}", self.base_url, path)
    }

    /// URL of the certificate view, optionally limited to rows after `since`.
    pub(crate) fn certificates_url(&self, since: Option<DateTime<Utc>>) -> String {
        let mut url = self.rest_url("/certificates_decrypted?select=*&order=updated_at.asc");
        if let Some(ts) = since {
            use std::fmt::Write;
            let _ = write!(url, "&updated_at=gt.{}", format_timestamp(ts));
        }
        url
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    /// Return the response for 2xx, otherwise an `Api` error with the server message.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(RemoteError::Api {
            status: status.as_u16(),
            message: error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").into()),
        })
    }

    async fn access_token(&self) -> Result<String, RemoteError> {
        self.current_session()
            .await?
            .map(|s| s.access_token)
            .ok_or(RemoteError::Unauthenticated)
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, RemoteError> {
        let resp = self
            .http
            .get(self.auth_url("/user"))
            .header(AUTHORIZATION, Self::bearer(access_token))
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RemoteSession, RemoteError> {
        let resp = self
            .http
            .post(self.auth_url("/token?grant_type=refresh_token"))
            .header(AUTHORIZATION, Self::bearer(&self.anon_key))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let token: TokenResponse = resp.json().await?;
        Ok(token.into_session(Utc::now()))
    }

    /// Refresh the held session. A rejected refresh token drops the session.
    async fn refresh_locked(
        &self,
        state: &mut SessionState,
        refresh_token: &str,
    ) -> Result<Option<RemoteSession>, RemoteError> {
        match self.refresh(refresh_token).await {
            Ok(fresh) => {
                debug!(user_id = %fresh.user_id, "Session refreshed");
                self.persist(&fresh);
                state.current = Some(fresh.clone());
                state.validated = true;
                Ok(Some(fresh))
            }
            Err(e) if e.is_rejected() => {
                warn!(error = %e, "Stored session is no longer valid");
                self.forget();
                state.current = None;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn persist(&self, session: &RemoteSession) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(session) {
                warn!(error = %e, path = %store.path().display(), "Failed to persist session");
            }
        }
    }

    /// Read the session file once per process.
    fn load_stored(&self, state: &mut SessionState) {
        if state.loaded {
            return;
        }
        state.loaded = true;
        if let Some(store) = &self.store {
            match store.load() {
                Ok(session) => state.current = session,
                Err(e) => warn!(error = %e, "Ignoring unreadable session file"),
            }
        }
    }

    fn forget(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!(error = %e, "Failed to remove session file");
            }
        }
    }

    /// End the session on the server and forget it locally.
    pub async fn sign_out(&self) -> Result<(), RemoteError> {
        let mut state = self.session.lock().await;
        self.load_stored(&mut state);
        if let Some(session) = state.current.take() {
            let resp = self
                .http
                .post(self.auth_url("/logout"))
                .header(AUTHORIZATION, Self::bearer(&session.access_token))
                .send()
                .await?;
            if let Err(e) = Self::check_status(resp).await {
                warn!(error = %e, "Server-side sign out failed");
            }
        }
        state.validated = false;
        state.loaded = true;
        self.forget();
        info!("Signed out");
        Ok(())
    }
}

#[async_trait]
impl RemoteService for SupabaseClient {
    async fn current_session(&self) -> Result<Option<RemoteSession>, RemoteError> {
        let mut state = self.session.lock().await;
        self.load_stored(&mut state);

        let Some(session) = state.current.clone() else {
            return Ok(None);
        };

        if session.is_expired(Utc::now(), REFRESH_LEEWAY_SECS) {
            return self.refresh_locked(&mut state, &session.refresh_token).await;
        }

        if !state.validated {
            match self.get_user(&session.access_token).await {
                Ok(user) => {
                    if user.id != session.user_id {
                        warn!(stored = %session.user_id, actual = %user.id, "Session user changed");
                    }
                    state.validated = true;
                }
                Err(e) if e.is_rejected() => {
                    return self.refresh_locked(&mut state, &session.refresh_token).await;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Some(session))
    }

    async fn sign_in_anonymously(&self) -> Result<RemoteSession, RemoteError> {
        let resp = self
            .http
            .post(self.auth_url("/signup"))
            .header(AUTHORIZATION, Self::bearer(&self.anon_key))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let token: TokenResponse = resp.json().await?;
        let anonymous = token.user.is_anonymous;
        let session = token.into_session(Utc::now());

        info!(user_id = %session.user_id, anonymous, "Signed in");
        self.persist(&session);

        let mut state = self.session.lock().await;
        state.current = Some(session.clone());
        state.loaded = true;
        state.validated = true;
        Ok(session)
    }

    async fn insert_certificate(&self, upload: &CertificateUpload) -> Result<(), RemoteError> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .post(self.rest_url("/rpc/insert_certificate"))
            .header(AUTHORIZATION, Self::bearer(&token))
            .json(upload)
            .send()
            .await?;
        Self::check_status(resp).await?;
        debug!(client_id = %upload.client_id, "Certificate uploaded");
        Ok(())
    }

    async fn fetch_certificates_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteCertificate>, RemoteError> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .get(self.certificates_url(since))
            .header(AUTHORIZATION, Self::bearer(&token))
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn fetch_certificate_file(&self, remote_id: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .post(self.rest_url("/rpc/get_certificate_file"))
            .header(AUTHORIZATION, Self::bearer(&token))
            .json(&FileRequest {
                p_certificate_id: remote_id,
            })
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let encoded: Option<String> = resp.json().await?;
        encoded
            .map(|data| {
                STANDARD
                    .decode(data.trim())
                    .map_err(|e| RemoteError::Decode(format!("file data: {e}")))
            })
            .transpose()
    }

    async fn delete_certificate_by_client_id(&self, client_id: &str) -> Result<(), RemoteError> {
        let token = self.access_token().await?;
        let url = self.rest_url(&format!("/certificates?client_id=eq.{client_id}"));
        let resp = self
            .http
            .delete(&url)
            .header(AUTHORIZATION, Self::bearer(&token))
            .header("Prefer", "return=minimal")
            .send()
            .await?;
        Self::check_status(resp).await?;
        debug!(client_id, "Remote certificate deleted");
        Ok(())
    }
}

/// Pull a human-readable message out of a `GoTrue` or `PostgREST` error body.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .into_iter()
        .find_map(|field| value.get(field)?.as_str().map(str::to_string))
}
