use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use tokio::fs;

use crate::Result;

pub mod providers;
pub use providers::MemoryObjectStore;

#[cfg(feature = "aws-storage")]
pub use providers::S3ObjectStore;

/// Capability interface over a remote key/value blob store.
///
/// Every call round-trips to the backend. Implementations report failures as
/// [`crate::PeriodicBackupError::Transfer`] and never retry; retry policy
/// belongs to the caller.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync + std::fmt::Debug {
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>>;

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn put_file(&self, bucket: &str, key: &str, source: &Path) -> Result<()> {
        let data = fs::read(source).await?;
        self.put(bucket, key, Bytes::from(data)).await
    }

    async fn get_to_file(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64> {
        let data = self.get(bucket, key).await?;
        fs::write(destination, &data).await?;
        Ok(data.len() as u64)
    }
}
