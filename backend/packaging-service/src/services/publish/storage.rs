/// Object storage seam for publishing and source download
use async_trait::async_trait;
use bytes::Bytes;
use s3_utils::S3Operations;
use std::path::Path;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct StorageError(pub String);

/// Write access to the remote object store
///
/// `put` must be idempotent: the same key and body overwrite cleanly.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError>;
}

/// Read access used to fetch a source video
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Download `key` to `dest`, returning the number of bytes written
    async fn fetch(&self, key: &str, dest: &Path) -> Result<u64, StorageError>;
}

#[async_trait]
impl ObjectStorage for S3Operations {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError> {
        self.put_object(key, body, content_type)
            .await
            .map_err(|e| StorageError(e.to_string()))
    }
}

#[async_trait]
impl SourceFetcher for S3Operations {
    async fn fetch(&self, key: &str, dest: &Path) -> Result<u64, StorageError> {
        self.download_to_path(key, dest)
            .await
            .map_err(|e| StorageError(e.to_string()))
    }
}
