//! File-backed credential storage
//!
//! Keeps the refresh token and the access-token cache in two independent JSON
//! files so that a corrupt cache never costs the refresh token. All writes use
//! atomic temp-file + rename with 0600 permissions; a tokio Mutex serializes
//! writers so concurrent saves never share a temp file.

use std::path::{Path, PathBuf};

use common::Secret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::store::{AccessTokenRecord, CredentialStore, StoreFuture};

/// Default file name for the refresh-token record
pub const REFRESH_TOKEN_FILE: &str = "zoho_secrets.json";

/// Default file name for the access-token cache
pub const ACCESS_TOKEN_FILE: &str = "token_cache.json";

/// On-disk shape of the refresh-token record.
#[derive(Debug, Serialize, Deserialize)]
struct RefreshTokenRecord {
    refresh_token: String,
}

/// Credential store backed by two JSON files.
pub struct FileCredentialStore {
    refresh_path: PathBuf,
    access_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(refresh_path: PathBuf, access_path: PathBuf) -> Self {
        Self {
            refresh_path,
            access_path,
            write_lock: Mutex::new(()),
        }
    }

    /// Store both records under `dir` using the default file names.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(REFRESH_TOKEN_FILE), dir.join(ACCESS_TOKEN_FILE))
    }

    pub fn refresh_path(&self) -> &Path {
        &self.refresh_path
    }

    pub fn access_path(&self) -> &Path {
        &self.access_path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load_refresh_token(&self) -> StoreFuture<'_, Option<Secret<String>>> {
        Box::pin(async move {
            read_json::<RefreshTokenRecord>(&self.refresh_path)
                .await
                .map(|r| r.refresh_token)
                .filter(|t| !t.is_empty())
                .map(Secret::new)
        })
    }

    fn save_refresh_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Result<()>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let record = RefreshTokenRecord {
                refresh_token: token.to_owned(),
            };
            write_atomic(&self.refresh_path, &record).await
        })
    }

    fn load_access_token(&self) -> StoreFuture<'_, Option<AccessTokenRecord>> {
        Box::pin(async move { read_json(&self.access_path).await })
    }

    fn save_access_token<'a>(
        &'a self,
        record: &'a AccessTokenRecord,
    ) -> StoreFuture<'a, Result<()>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            write_atomic(&self.access_path, record).await
        })
    }
}

/// Read and parse a JSON record. Missing, unreadable and corrupt files all
/// come back as `None`.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "credential file not found");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "credential file unreadable, treating as missing");
            return None;
        }
    };

    match serde_json::from_str(&contents) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "credential file corrupt, treating as missing");
            None
        }
    }
}

/// Write a record to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target, so a reader sees either the old or the new record. Sets file
/// permissions to 0600 (owner read/write only) since the file holds tokens.
async fn write_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Io(format!("serializing credential record: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;
    if !dir.as_os_str().is_empty() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Io(format!("creating credential directory: {e}")))?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Io("credential path has no file name".into()))?;
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credential record");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(token: &str, expires_at: u64) -> AccessTokenRecord {
        AccessTokenRecord {
            token: token.into(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn refresh_token_roundtrips_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileCredentialStore::in_dir(dir.path());
        store.save_refresh_token("1000.rt_abc").await.unwrap();

        let reopened = FileCredentialStore::in_dir(dir.path());
        let loaded = reopened.load_refresh_token().await.unwrap();
        assert_eq!(loaded.expose(), "1000.rt_abc");
    }

    #[tokio::test]
    async fn save_refresh_token_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());

        store.save_refresh_token("rt_old").await.unwrap();
        store.save_refresh_token("rt_new").await.unwrap();

        assert_eq!(store.load_refresh_token().await.unwrap().expose(), "rt_new");
        let raw = tokio::fs::read_to_string(store.refresh_path()).await.unwrap();
        assert!(!raw.contains("rt_old"));
    }

    #[tokio::test]
    async fn access_token_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());

        store.save_access_token(&record("at_1", 1_900_000_000)).await.unwrap();
        assert_eq!(
            store.load_access_token().await,
            Some(record("at_1", 1_900_000_000))
        );
    }

    #[tokio::test]
    async fn missing_files_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());

        assert!(store.load_refresh_token().await.is_none());
        assert!(store.load_access_token().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_files_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());

        tokio::fs::write(store.access_path(), "{\"access_token\": \"trunc")
            .await
            .unwrap();
        tokio::fs::write(store.refresh_path(), "not json at all")
            .await
            .unwrap();

        assert!(store.load_access_token().await.is_none());
        assert!(store.load_refresh_token().await.is_none());
    }

    #[tokio::test]
    async fn wrong_shape_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());

        // Valid JSON, but expires_at missing
        tokio::fs::write(store.access_path(), r#"{"access_token":"at"}"#)
            .await
            .unwrap();
        assert!(store.load_access_token().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_cache_does_not_affect_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        store.save_refresh_token("rt_keep").await.unwrap();
        tokio::fs::write(store.access_path(), "garbage").await.unwrap();

        assert!(store.load_access_token().await.is_none());
        assert_eq!(store.load_refresh_token().await.unwrap().expose(), "rt_keep");
    }

    #[tokio::test]
    async fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state").join("zoho");
        let store = FileCredentialStore::in_dir(&nested);

        store.save_refresh_token("rt").await.unwrap();
        assert!(nested.join(REFRESH_TOKEN_FILE).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        store.save_refresh_token("rt").await.unwrap();
        store.save_access_token(&record("at", 1)).await.unwrap();

        for path in [store.refresh_path(), store.access_path()] {
            let mode = tokio::fs::metadata(path).await.unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600, "{} must be 0600, got {mode:o}", path.display());
        }
    }

    #[tokio::test]
    async fn concurrent_writes_leave_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCredentialStore::in_dir(dir.path()));

        let mut handles = vec![];
        for i in 0..10u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .save_access_token(&record(&format!("at_{i}"), i))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let loaded = store.load_access_token().await.expect("cache must parse");
        assert_eq!(loaded.token, format!("at_{}", loaded.expires_at));
    }
}
