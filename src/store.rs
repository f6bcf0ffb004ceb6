//! Key-value persistence for encrypted parameter blobs.
//!
//! Keys are site-key fingerprints and values are opaque blobs; nothing in
//! this module ever sees plaintext parameters.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::{CryptnosError, Result};
use crate::storage::Storage;

/// The storage collaborator the core depends on.
pub trait ParamStore {
    fn get(&self, site_key: &str) -> Result<Option<String>>;

    /// Inserts or replaces the blob stored under `site_key`.
    fn put(&mut self, site_key: &str, blob: &str) -> Result<()>;

    /// Returns whether a record was removed.
    fn delete(&mut self, site_key: &str) -> Result<bool>;

    /// Returns the number of removed records.
    fn delete_all(&mut self) -> Result<usize>;

    fn list_all(&self) -> Result<Vec<(String, String)>>;

    fn count(&self) -> Result<usize>;

    fn contains(&self, site_key: &str) -> Result<bool> {
        Ok(self.get(site_key)?.is_some())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoredEntry {
    blob: String,
    updated: String,
}

impl StoredEntry {
    fn new(blob: String) -> Self {
        Self {
            blob,
            updated: Local::now().to_rfc3339(),
        }
    }

    pub fn blob(&self) -> &str {
        &self.blob
    }

    pub fn updated(&self) -> &str {
        &self.updated
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, StoredEntry>,
    creation_date: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            entries: BTreeMap::new(),
            creation_date: Local::now().to_rfc3339(),
        }
    }

    pub fn creation_date(&self) -> &str {
        &self.creation_date
    }

    pub fn entry(&self, site_key: &str) -> Option<&StoredEntry> {
        self.entries.get(site_key)
    }
}

impl ParamStore for MemoryStore {
    fn get(&self, site_key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(site_key).map(|e| e.blob.clone()))
    }

    fn put(&mut self, site_key: &str, blob: &str) -> Result<()> {
        self.entries
            .insert(site_key.to_string(), StoredEntry::new(blob.to_string()));
        Ok(())
    }

    fn delete(&mut self, site_key: &str) -> Result<bool> {
        Ok(self.entries.remove(site_key).is_some())
    }

    fn delete_all(&mut self) -> Result<usize> {
        let removed = self.entries.len();
        self.entries.clear();
        Ok(removed)
    }

    fn list_all(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.blob.clone()))
            .collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}

/// A [`MemoryStore`] persisted as JSON after every mutation.
///
/// Each write goes through [`Storage::save`], so a crash leaves either the
/// previous or the new document on disk.
#[derive(Debug)]
pub struct FileStore {
    inner: MemoryStore,
    storage: Storage,
}

impl FileStore {
    /// Opens the store at `storage`, starting empty if the file is missing.
    pub fn open(storage: Storage) -> Result<Self> {
        let inner = if storage.exists() {
            let data = storage.load()?;
            serde_json::from_slice(&data)
                .map_err(|e| CryptnosError::StoreIo(format!("unreadable store file: {e}")))?
        } else {
            MemoryStore::new()
        };

        tracing::debug!(path = %storage.path().display(), records = inner.entries.len(), "opened store");
        Ok(Self { inner, storage })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn creation_date(&self) -> &str {
        self.inner.creation_date()
    }

    pub fn entry(&self, site_key: &str) -> Option<&StoredEntry> {
        self.inner.entry(site_key)
    }

    fn persist(&self) -> Result<()> {
        let data = serde_json::to_vec(&self.inner).map_err(CryptnosError::store_io)?;
        self.storage.save(&data)
    }

    /// Applies `change` and persists; on a failed write the in-memory state
    /// is rolled back so it keeps matching the file.
    fn mutate<T>(&mut self, change: impl FnOnce(&mut MemoryStore) -> Result<T>) -> Result<T> {
        let before = self.inner.clone();
        let out = change(&mut self.inner)?;
        if let Err(e) = self.persist() {
            self.inner = before;
            return Err(e);
        }
        Ok(out)
    }
}

impl ParamStore for FileStore {
    fn get(&self, site_key: &str) -> Result<Option<String>> {
        self.inner.get(site_key)
    }

    fn put(&mut self, site_key: &str, blob: &str) -> Result<()> {
        self.mutate(|s| s.put(site_key, blob))
    }

    fn delete(&mut self, site_key: &str) -> Result<bool> {
        if !self.inner.entries.contains_key(site_key) {
            return Ok(false);
        }
        self.mutate(|s| s.delete(site_key))
    }

    fn delete_all(&mut self) -> Result<usize> {
        self.mutate(|s| s.delete_all())
    }

    fn list_all(&self) -> Result<Vec<(String, String)>> {
        self.inner.list_all()
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }
}

/// A store shared between a caller and background workers.
///
/// Every operation takes the lock for its own duration, so at most one
/// write is in flight and each write is applied whole.
#[derive(Debug)]
pub struct SharedStore<S>(Arc<Mutex<S>>);

impl<S> Clone for SharedStore<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S: ParamStore> SharedStore<S> {
    pub fn new(store: S) -> Self {
        Self(Arc::new(Mutex::new(store)))
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, S>> {
        self.0
            .lock()
            .map_err(|_| CryptnosError::StoreIo("store lock poisoned".into()))
    }
}

impl<S: ParamStore> ParamStore for SharedStore<S> {
    fn get(&self, site_key: &str) -> Result<Option<String>> {
        self.lock()?.get(site_key)
    }

    fn put(&mut self, site_key: &str, blob: &str) -> Result<()> {
        self.lock()?.put(site_key, blob)
    }

    fn delete(&mut self, site_key: &str) -> Result<bool> {
        self.lock()?.delete(site_key)
    }

    fn delete_all(&mut self) -> Result<usize> {
        self.lock()?.delete_all()
    }

    fn list_all(&self) -> Result<Vec<(String, String)>> {
        self.lock()?.list_all()
    }

    fn count(&self) -> Result<usize> {
        self.lock()?.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_new_store_works() {
        let store = MemoryStore::new();
        assert_eq!(store.count().unwrap(), 0);
        assert_ne!(store.creation_date(), "");
    }

    #[test]
    fn put_and_get_works() {
        let mut store = MemoryStore::new();
        store.put("A", "B").unwrap();
        assert_eq!(store.get("A").unwrap().as_deref(), Some("B"));
        assert!(store.contains("A").unwrap());
        assert_ne!(store.entry("A").unwrap().updated(), "");
    }

    #[test]
    fn put_existing_key_replaces() {
        let mut store = MemoryStore::new();
        store.put("A", "B").unwrap();
        store.put("A", "C").unwrap();
        assert_eq!(store.get("A").unwrap().as_deref(), Some("C"));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn delete_reports_presence() {
        let mut store = MemoryStore::new();
        store.put("A", "B").unwrap();
        assert!(store.delete("A").unwrap());
        assert!(!store.delete("A").unwrap());
        assert_eq!(store.get("A").unwrap(), None);
    }

    #[test]
    fn delete_all_and_list() {
        let mut store = MemoryStore::new();
        store.put("b", "2").unwrap();
        store.put("a", "1").unwrap();
        assert_eq!(
            store.list_all().unwrap(),
            vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
        );
        assert_eq!(store.delete_all().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn file_store_persists_each_mutation() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("params.json"));

        let mut store = FileStore::open(storage.clone()).unwrap();
        store.put("k1", "blob1").unwrap();
        store.put("k2", "blob2").unwrap();
        store.delete("k1").unwrap();

        let reopened = FileStore::open(storage).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
        assert_eq!(reopened.get("k2").unwrap().as_deref(), Some("blob2"));
        assert_eq!(reopened.creation_date(), store.creation_date());
    }

    #[test]
    fn file_store_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(Storage::new(dir.path().join("none.json"))).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(!store.storage().exists());
    }

    #[test]
    fn unreadable_store_file_is_store_io() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("params.json"));
        storage.save(b"{ not json").unwrap();

        assert!(matches!(FileStore::open(storage), Err(CryptnosError::StoreIo(_))));
    }

    #[test]
    fn failed_write_rolls_back_memory() {
        let dir = tempdir().unwrap();
        // parent is a regular file, so every save fails
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let storage = Storage::new(blocker.join("params.json"));

        let mut store = FileStore::open(storage).unwrap();
        assert!(matches!(store.put("k", "v"), Err(CryptnosError::StoreIo(_))));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn shared_store_clones_see_the_same_records() {
        let shared = SharedStore::new(MemoryStore::new());
        let mut writer = shared.clone();

        let handle = std::thread::spawn(move || {
            for i in 0..10 {
                writer.put(&format!("k{i}"), "blob").unwrap();
            }
        });
        handle.join().unwrap();

        assert_eq!(shared.count().unwrap(), 10);
        assert!(shared.contains("k9").unwrap());
    }
}
