//! JSON file backed key-value store
//!
//! The whole map lives in memory and is rewritten to disk on every change:
//! serialize to a sibling temp file, then rename over the target. A file
//! that does not parse is logged and replaced with an empty map.

use crate::domain::shared::Result;
use crate::domain::storage::KeyValueStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct JsonFileKvStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileKvStore {
    /// Open (or create) the store at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Store file {} is corrupt, starting empty: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!("Opened key-value store {} ({} keys)", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let raw = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Flushed {} keys to {}", entries.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries).await {
            // keep memory consistent with disk
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries).await {
            entries.remove(key);
            return Err(e);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("calltrack.json");

        let store = JsonFileKvStore::open(&path).await.unwrap();
        store.put("identity.4155550199", "abc").await.unwrap();
        store.put_i64("finalLock.4155550199", 42).await.unwrap();
        drop(store);

        let reopened = JsonFileKvStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("identity.4155550199").await.unwrap().as_deref(),
            Some("abc")
        );
        assert_eq!(reopened.get_i64("finalLock.4155550199").await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("calltrack.json");
        tokio::fs::write(&path, "{{{").await.unwrap();

        let store = JsonFileKvStore::open(&path).await.unwrap();
        assert!(store.get("anything").await.unwrap().is_none());

        store.put("k", "v").await.unwrap();
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains("\"k\""));
    }

    #[tokio::test]
    async fn test_remove_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("calltrack.json");
        let store = JsonFileKvStore::open(&path).await.unwrap();
        store.put("k", "v").await.unwrap();
        store.remove("k").await.unwrap();

        let reopened = JsonFileKvStore::open(&path).await.unwrap();
        assert!(reopened.get("k").await.unwrap().is_none());
    }
}
