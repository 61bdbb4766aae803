//! Access token provider
//!
//! Every outbound payment API call asks the provider for a token. The cached
//! record is returned as-is while it is fresh; otherwise the refresh token is
//! exchanged for a new one and the cache is rewritten.
//!
//! Refreshes run inside a single critical section. A caller that finds the
//! cache expired takes the lock, then re-reads the cache: if another caller
//! refreshed in the meantime it gets that token and no request is sent. N
//! concurrent expirations therefore cost exactly one token endpoint call.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::capture::{self, CaptureOutcome};
use crate::error::{Error, Result};
use crate::store::{AccessTokenRecord, CredentialStore};
use crate::token::TokenClient;

/// State of the cached access token, for health reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessTokenState {
    Missing,
    Valid { expires_at: u64 },
    Expired { expires_at: u64 },
}

impl AccessTokenState {
    pub fn label(&self) -> &'static str {
        match self {
            AccessTokenState::Missing => "missing",
            AccessTokenState::Valid { .. } => "valid",
            AccessTokenState::Expired { .. } => "expired",
        }
    }
}

/// Snapshot of the credential lifecycle.
#[derive(Debug, Clone)]
pub struct CredentialStatus {
    pub refresh_token_captured: bool,
    pub access_token: AccessTokenState,
}

/// Owns the credential store and token client for the one Zoho account.
pub struct AccessTokenProvider {
    store: Arc<dyn CredentialStore>,
    client: TokenClient,
    /// Held for the duration of a refresh. Also remembers the last issued
    /// record so waiters are served even if persisting it failed.
    refresh_lock: Mutex<Option<AccessTokenRecord>>,
}

impl AccessTokenProvider {
    pub fn new(store: Arc<dyn CredentialStore>, client: TokenClient) -> Self {
        Self {
            store,
            client,
            refresh_lock: Mutex::new(None),
        }
    }

    /// Return a currently valid access token, refreshing at most once.
    ///
    /// Fails with `Unauthorized` when no refresh token has been captured, and
    /// passes through `AuthServer` / `Network` from the token endpoint.
    #[instrument(skip_all)]
    pub async fn access_token(&self) -> Result<String> {
        if let Some(record) = self.store.load_access_token().await
            && !record.is_expired()
        {
            return Ok(record.token);
        }

        let mut last_issued = self.refresh_lock.lock().await;

        let now = common::unix_now_secs();
        if let Some(record) = self.store.load_access_token().await
            && !record.is_expired_at(now)
        {
            debug!("access token refreshed by a concurrent caller");
            return Ok(record.token);
        }
        if let Some(record) = last_issued.as_ref()
            && !record.is_expired_at(now)
        {
            return Ok(record.token.clone());
        }

        let record = self.refresh().await?;
        let token = record.token.clone();
        *last_issued = Some(record);
        Ok(token)
    }

    /// Exchange the stored refresh token and persist the new access token.
    /// Must be called with `refresh_lock` held.
    async fn refresh(&self) -> Result<AccessTokenRecord> {
        let Some(refresh_token) = self.store.load_refresh_token().await else {
            record_refresh("unauthorized");
            return Err(Error::Unauthorized(
                "no refresh token captured yet, complete the authorization flow at /oauth/start"
                    .into(),
            ));
        };

        let record = match self.client.refresh(refresh_token.expose()).await {
            Ok(record) => record,
            Err(e) => {
                record_refresh(e.kind());
                warn!(error = %e, "access token refresh failed");
                return Err(e);
            }
        };
        record_refresh("success");

        if let Err(e) = self.store.save_access_token(&record).await {
            warn!(error = %e, "failed to persist refreshed access token");
        }
        info!(expires_at = record.expires_at, "access token refreshed");
        Ok(record)
    }

    /// Complete the one-time consent flow with the code from the redirect.
    ///
    /// The refresh token (when granted) and the first access token are both
    /// persisted, and the in-memory record is replaced under the refresh lock.
    pub async fn capture_authorization(&self, code: &str) -> Result<CaptureOutcome> {
        let mut last_issued = self.refresh_lock.lock().await;
        let (outcome, record) =
            capture::capture_authorization(&self.client, self.store.as_ref(), code).await?;
        *last_issued = Some(record);
        Ok(outcome)
    }

    /// Report whether a refresh token exists and how the cache looks.
    pub async fn status(&self) -> CredentialStatus {
        let refresh_token_captured = self.store.load_refresh_token().await.is_some();
        let access_token = match self.store.load_access_token().await {
            None => AccessTokenState::Missing,
            Some(r) if r.is_expired() => AccessTokenState::Expired {
                expires_at: r.expires_at,
            },
            Some(r) => AccessTokenState::Valid {
                expires_at: r.expires_at,
            },
        };
        CredentialStatus {
            refresh_token_captured,
            access_token,
        }
    }

    pub fn client(&self) -> &TokenClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }
}

fn record_refresh(outcome: &'static str) {
    metrics::counter!("token_refresh_total", "outcome" => outcome).increment(1);
}
