//! Credential store abstraction
//!
//! The store holds exactly two records: the long-lived refresh token captured
//! during the consent flow, and the disposable access-token cache. Loads are
//! infallible by contract: a record that cannot be read or parsed is reported
//! as missing so the provider self-heals with one extra refresh.
//!
//! `FileCredentialStore` (see `credentials`) is the production backend;
//! `MemoryCredentialStore` backs tests and embedders that keep tokens
//! elsewhere. An encrypted secret store only needs to implement the trait.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::constants::EXPIRY_MARGIN_SECS;
use crate::error::Result;

/// Boxed future returned by store operations, keeping the trait object-safe.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Cached access token with its absolute expiry.
///
/// `expires_at` is a unix timestamp in seconds that already has the safety
/// margin subtracted, so `now >= expires_at` means "refresh before use".
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    #[serde(rename = "access_token")]
    pub token: String,
    pub expires_at: u64,
}

impl AccessTokenRecord {
    /// Build a record from a server-declared lifetime in seconds.
    pub fn from_lifetime(token: String, expires_in: u64, now: u64) -> Self {
        Self {
            token,
            expires_at: now.saturating_add(expires_in.saturating_sub(EXPIRY_MARGIN_SECS)),
        }
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(common::unix_now_secs())
    }
}

impl fmt::Debug for AccessTokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenRecord")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Persistence for one account's refresh token and access-token cache.
///
/// Uses boxed futures for dyn-compatibility (`Arc<dyn CredentialStore>`).
pub trait CredentialStore: Send + Sync {
    /// The captured refresh token, or `None` if the consent flow never ran.
    fn load_refresh_token(&self) -> StoreFuture<'_, Option<Secret<String>>>;

    /// Overwrite the refresh token. Saving the same value twice is a no-op
    /// in effect.
    fn save_refresh_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Result<()>>;

    /// The cached access token, or `None` if absent or unreadable.
    fn load_access_token(&self) -> StoreFuture<'_, Option<AccessTokenRecord>>;

    /// Replace the cached access token.
    fn save_access_token<'a>(&'a self, record: &'a AccessTokenRecord)
    -> StoreFuture<'a, Result<()>>;
}

/// In-process credential store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryCredentialStore {
    refresh: Mutex<Option<String>>,
    access: Mutex<Option<AccessTokenRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a refresh token already captured.
    pub fn with_refresh_token(token: impl Into<String>) -> Self {
        Self {
            refresh: Mutex::new(Some(token.into())),
            access: Mutex::new(None),
        }
    }

    /// Seed the access-token cache.
    pub fn with_access_token(self, record: AccessTokenRecord) -> Self {
        Self {
            refresh: self.refresh,
            access: Mutex::new(Some(record)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_refresh_token(&self) -> StoreFuture<'_, Option<Secret<String>>> {
        Box::pin(async move {
            self.refresh
                .lock()
                .await
                .clone()
                .filter(|t| !t.is_empty())
                .map(Secret::new)
        })
    }

    fn save_refresh_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Result<()>> {
        Box::pin(async move {
            *self.refresh.lock().await = Some(token.to_owned());
            Ok(())
        })
    }

    fn load_access_token(&self) -> StoreFuture<'_, Option<AccessTokenRecord>> {
        Box::pin(async move { self.access.lock().await.clone() })
    }

    fn save_access_token<'a>(
        &'a self,
        record: &'a AccessTokenRecord,
    ) -> StoreFuture<'a, Result<()>> {
        Box::pin(async move {
            *self.access.lock().await = Some(record.clone());
            Ok(())
        })
    }
}
