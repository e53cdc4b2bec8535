//! Core MemoStore implementation

use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use eyre::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A stored value with its expiry (unix ms)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: serde_json::Value,
    expires_at: i64,
}

impl StoredEntry {
    fn is_live(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at
    }
}

/// Summary of one stored entry, for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: String,
    /// Expiry instant (unix ms)
    pub expires_at: i64,
    pub expired: bool,
}

/// Durable key-value cache with per-entry expiry
pub struct MemoStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, StoredEntry>>,
}

impl MemoStore {
    /// Open or create a store backed by the given file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context(format!("Failed to create cache directory {}", parent.display()))?;
        }

        let entries = if path.exists() {
            let content = fs::read_to_string(&path).context(format!("Failed to read cache file {}", path.display()))?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).context(format!("Failed to parse cache file {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };

        debug!(?path, entry_count = entries.len(), "MemoStore::open: opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the cached value for `key`, or run `producer` and cache its result for `ttl`
    ///
    /// A producer error is returned as-is and nothing is written.
    pub async fn remember<T, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get::<T>(key)? {
            debug!(%key, "MemoStore::remember: hit");
            return Ok(value);
        }

        debug!(%key, "MemoStore::remember: miss, running producer");
        let value = producer().await?;
        self.put(key, &value, ttl)?;
        Ok(value)
    }

    /// Unexpired value for `key`, if any
    ///
    /// A stored value that no longer matches `T` counts as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let now = now_ms();
        let entries = self.lock()?;
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        if !entry.is_live(now) {
            return Ok(None);
        }
        match serde_json::from_value(entry.value.clone()) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(%key, error = %e, "MemoStore::get: stored value has unexpected shape, ignoring");
                Ok(None)
            }
        }
    }

    /// Store `value` under `key`, expiring `ttl` from now
    pub fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = StoredEntry {
            value: serde_json::to_value(value).context(format!("Failed to serialize value for key {}", key))?,
            expires_at: now_ms().saturating_add(ttl_ms),
        };

        let mut entries = self.lock()?;
        entries.insert(key.to_string(), entry);
        self.persist(&entries)
    }

    /// Delete `key`; returns whether an entry was present
    pub fn forget(&self, key: &str) -> Result<bool> {
        debug!(%key, "MemoStore::forget: called");
        let mut entries = self.lock()?;
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        self.persist(&entries)?;
        Ok(true)
    }

    /// All stored entries, expired ones included
    pub fn keys(&self) -> Result<Vec<EntryInfo>> {
        let now = now_ms();
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .map(|(key, entry)| EntryInfo {
                key: key.clone(),
                expires_at: entry.expires_at,
                expired: !entry.is_live(now),
            })
            .collect())
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> Result<usize> {
        let now = now_ms();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries)?;
        }
        debug!(removed, "MemoStore::purge_expired: done");
        Ok(removed)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, StoredEntry>>> {
        self.entries
            .lock()
            .map_err(|_| eyre::eyre!("Cache state poisoned for {}", self.path.display()))
    }

    /// Write the whole document to a temp file, then rename over the old one
    fn persist(&self, entries: &BTreeMap<String, StoredEntry>) -> Result<()> {
        let content = serde_json::to_string(entries).context("Failed to serialize cache")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).context(format!("Failed to write cache file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).context(format!("Failed to replace cache file {}", self.path.display()))?;
        Ok(())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_remember_calls_producer_once_within_ttl() {
        let temp = tempdir().unwrap();
        let store = MemoStore::open(temp.path().join("cache.json")).unwrap();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Vec<u32> = store
                .remember("pipelines", HOUR, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remember_recomputes_after_expiry() {
        let temp = tempdir().unwrap();
        let store = MemoStore::open(temp.path().join("cache.json")).unwrap();
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_millis(20);

        for _ in 0..2 {
            let _: String = store
                .remember("users", ttl, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("alice".to_string())
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;

        let _: String = store
            .remember("users", ttl, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("alice".to_string())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_producer_error_is_not_cached() {
        let temp = tempdir().unwrap();
        let store = MemoStore::open(temp.path().join("cache.json")).unwrap();

        let result: Result<u32> = store
            .remember("lead:1", HOUR, || async { Err(eyre::eyre!("upstream down")) })
            .await;
        assert!(result.is_err());
        assert!(store.keys().unwrap().is_empty());

        let value: u32 = store.remember("lead:1", HOUR, || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("cache.json");

        {
            let store = MemoStore::open(&path).unwrap();
            store.put("users", &vec!["Ivan Petrov".to_string()], HOUR).unwrap();
        }

        let store = MemoStore::open(&path).unwrap();
        let value: Vec<String> = store
            .remember("users", HOUR, || async { Err(eyre::eyre!("producer must not run")) })
            .await
            .unwrap();
        assert_eq!(value, vec!["Ivan Petrov".to_string()]);
    }

    #[test]
    fn test_forget_is_idempotent() {
        let temp = tempdir().unwrap();
        let store = MemoStore::open(temp.path().join("cache.json")).unwrap();
        store.put("pipelines", &1, HOUR).unwrap();

        assert!(store.forget("pipelines").unwrap());
        assert!(!store.forget("pipelines").unwrap());
        assert!(!store.forget("never-set").unwrap());
        assert_eq!(store.get::<i32>("pipelines").unwrap(), None);
    }

    #[test]
    fn test_shape_mismatch_is_a_miss() {
        let temp = tempdir().unwrap();
        let store = MemoStore::open(temp.path().join("cache.json")).unwrap();
        store.put("users", &"not a list", HOUR).unwrap();

        assert_eq!(store.get::<Vec<u32>>("users").unwrap(), None);
    }

    #[test]
    fn test_purge_expired() {
        let temp = tempdir().unwrap();
        let store = MemoStore::open(temp.path().join("cache.json")).unwrap();
        store.put("stale", &1, Duration::ZERO).unwrap();
        store.put("fresh", &2, HOUR).unwrap();

        let keys = store.keys().unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().find(|k| k.key == "stale").unwrap().expired);

        assert_eq!(store.purge_expired().unwrap(), 1);
        let keys = store.keys().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key, "fresh");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("cache.json");
        fs::write(&path, "{not json").unwrap();

        assert!(MemoStore::open(&path).is_err());
    }
}
