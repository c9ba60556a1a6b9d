//! Profile-scoped key/value storage.
//!
//! The device registry and registration coordinator persist small state
//! entries (cached token, retry counters, breaker timestamps) that must
//! survive process restarts. All keys share one application namespace.
//!
//! Writes are atomic within a process only. Two processes sharing a file
//! store can interleave; the durable per-user record is the tiebreaker
//! and consumers treat this store as a hint.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::Mutex;

use crate::{AppError, AppResult};

/// Well-known store keys.
pub mod keys {
    /// Cached push messaging token.
    pub const FCM_TOKEN: &str = "fcm_token";
    /// Stable device identifier for this profile.
    pub const DEVICE_ID: &str = "device_id";
    /// Timestamp of the last registration attempt.
    pub const LAST_ATTEMPT: &str = "last_registration_attempt";
    /// Timestamp of the last successful registration.
    pub const LAST_REGISTRATION: &str = "last_registration";
    /// Consecutive failed registration attempts.
    pub const RETRY_COUNT: &str = "registration_retry_count";
    /// Timestamp at which the registration circuit opened.
    pub const CIRCUIT_OPENED: &str = "registration_circuit_opened";
    /// Timestamp of the last auto-enable attempt.
    pub const LAST_AUTO_ENABLE: &str = "last_auto_enable";
}

const NAMESPACE: &str = "fieldline";

fn namespaced(key: &str) -> String {
    format!("{NAMESPACE}:{key}")
}

/// Local store backend trait.
#[async_trait::async_trait]
pub trait LocalStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Write a value.
    async fn put(&self, key: &str, value: &str) -> AppResult<()>;

    /// Remove a value.
    async fn remove(&self, key: &str) -> AppResult<()>;
}

/// In-memory store. Used in tests and for ephemeral contexts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock().await.get(&namespaced(key)).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries
            .lock()
            .await
            .insert(namespaced(key), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.entries.lock().await.remove(&namespaced(key));
        Ok(())
    }
}

/// JSON-file-backed store scoped to one profile directory.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store backed by the given file path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> AppResult<HashMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AppError::Internal(format!("Corrupt local store: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(AppError::Internal(format!("Failed to read local store: {e}"))),
        }
    }

    async fn save(&self, entries: &HashMap<String, String>) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create directory: {e}")))?;
        }
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| AppError::Internal(format!("Failed to serialize local store: {e}")))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write local store: {e}")))
    }
}

#[async_trait::async_trait]
impl LocalStore for FileStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.get(&namespaced(key)).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(namespaced(key), value.to_string());
        self.save(&entries).await
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(&namespaced(key)).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get(keys::FCM_TOKEN).await.unwrap().is_none());

        store.put(keys::FCM_TOKEN, "tok-1").await.unwrap();
        assert_eq!(
            store.get(keys::FCM_TOKEN).await.unwrap().as_deref(),
            Some("tok-1")
        );

        store.remove(keys::FCM_TOKEN).await.unwrap();
        assert!(store.get(keys::FCM_TOKEN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_share_one_namespace() {
        let store = MemoryStore::new();
        store.put(keys::RETRY_COUNT, "3").await.unwrap();

        let entries = store.entries.lock().await;
        assert!(entries.contains_key("fieldline:registration_retry_count"));
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("fieldline-store-{}", uuid::Uuid::new_v4()));
        let path = dir.join("local.json");

        let store = FileStore::new(path.clone());
        store.put(keys::DEVICE_ID, "dev-1").await.unwrap();
        drop(store);

        let reopened = FileStore::new(path);
        assert_eq!(
            reopened.get(keys::DEVICE_ID).await.unwrap().as_deref(),
            Some("dev-1")
        );

        tokio::fs::remove_dir_all(dir).await.unwrap();
    }

    #[tokio::test]
    async fn file_store_missing_file_reads_empty() {
        let dir = std::env::temp_dir().join(format!("fieldline-store-{}", uuid::Uuid::new_v4()));
        let store = FileStore::new(dir.join("absent.json"));
        assert!(store.get(keys::FCM_TOKEN).await.unwrap().is_none());
    }
}
