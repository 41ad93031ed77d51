//! In-process object store
//!
//! Keeps buckets in memory. Used by tests and dry runs; supports injecting
//! per-key failures and counts every call so callers can assert that an
//! operation performed no I/O.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::storage::ObjectStoreClient;
use crate::{PeriodicBackupError, Result};

#[derive(Debug)]
pub struct MemoryObjectStore {
    available: AtomicBool,
    buckets: RwLock<BTreeMap<String, BTreeMap<String, Bytes>>>,
    failing_keys: RwLock<HashSet<String>>,
    calls: AtomicUsize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            buckets: RwLock::new(BTreeMap::new()),
            failing_keys: RwLock::new(HashSet::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        store.create_bucket(bucket);
        store
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.buckets.write().entry(bucket.to_string()).or_default();
    }

    /// Simulate the backend going away; every call fails with a transfer error.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every put/get/delete of `key` fail.
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.write().insert(key.to_string());
    }

    /// Keys currently stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of client calls made against this store.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, bucket: &str, key: Option<&str>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(PeriodicBackupError::Transfer(format!(
                "object store unavailable (bucket {})",
                bucket
            )));
        }
        if let Some(key) = key {
            if self.failing_keys.read().contains(key) {
                return Err(PeriodicBackupError::Transfer(format!(
                    "injected failure for {}/{}",
                    bucket, key
                )));
            }
        }
        Ok(())
    }

    fn no_such_bucket(bucket: &str) -> PeriodicBackupError {
        PeriodicBackupError::Transfer(format!("no such bucket: {}", bucket))
    }
}

#[async_trait]
impl ObjectStoreClient for MemoryObjectStore {
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>> {
        self.check(bucket, None)?;
        self.buckets
            .read()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .ok_or_else(|| Self::no_such_bucket(bucket))
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        self.check(bucket, Some(key))?;
        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_such_bucket(bucket))?;
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.check(bucket, Some(key))?;
        let buckets = self.buckets.read();
        let objects = buckets.get(bucket).ok_or_else(|| Self::no_such_bucket(bucket))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| {
                PeriodicBackupError::Transfer(format!("no such key: {}/{}", bucket, key))
            })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.check(bucket, Some(key))?;
        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_such_bucket(bucket))?;
        objects.remove(key);
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.check(bucket, None)?;
        Ok(self.buckets.read().contains_key(bucket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryObjectStore::with_bucket("backups");
        store.put("backups", "a.bin", Bytes::from_static(b"abc")).await.unwrap();

        assert_eq!(store.get("backups", "a.bin").await.unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(store.list_keys("backups").await.unwrap(), vec!["a.bin".to_string()]);

        store.delete("backups", "a.bin").await.unwrap();
        assert!(store.keys("backups").is_empty());
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let store = MemoryObjectStore::new();
        assert!(!store.bucket_exists("nope").await.unwrap());
        assert!(matches!(
            store.list_keys("nope").await,
            Err(PeriodicBackupError::Transfer(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_failures_and_call_count() {
        let store = MemoryObjectStore::with_bucket("backups");
        store.fail_key("bad.bin");

        assert!(store.put("backups", "bad.bin", Bytes::new()).await.is_err());
        store.set_available(false);
        assert!(store.bucket_exists("backups").await.is_err());
        assert_eq!(store.call_count(), 2);
    }

    #[tokio::test]
    async fn test_file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.bin");
        tokio::fs::write(&source, b"payload").await.unwrap();

        let store = MemoryObjectStore::with_bucket("backups");
        store.put_file("backups", "k", &source).await.unwrap();

        let dest = dir.path().join("dest.bin");
        let size = store.get_to_file("backups", "k", &dest).await.unwrap();
        assert_eq!(size, 7);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"payload");
    }
}
