/// S3 object operations used by publishing and source download
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::S3Config;

#[derive(Debug, thiserror::Error)]
pub enum S3Error {
    #[error("S3 bucket is not configured")]
    MissingBucket,
    #[error("S3 request failed for {key}: {message}")]
    Request { key: String, message: String },
    #[error("local file error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone)]
pub struct S3Operations {
    client: Arc<Client>,
    config: S3Config,
}

impl S3Operations {
    pub fn new(client: Arc<Client>, config: S3Config) -> Self {
        Self { client, config }
    }

    fn bucket(&self) -> Result<&str, S3Error> {
        self.config.bucket().ok_or(S3Error::MissingBucket)
    }

    /// Upload bytes to `key`, overwriting any existing object
    pub async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), S3Error> {
        let bucket = self.bucket()?;
        let size = body.len();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| S3Error::Request {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(bucket, key, size, content_type, "S3 object uploaded");
        Ok(())
    }

    /// Download an object into memory
    pub async fn get_object(&self, key: &str) -> Result<Bytes, S3Error> {
        let bucket = self.bucket()?;
        let request_error = |message: String| S3Error::Request {
            key: key.to_string(),
            message,
        };

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| request_error(DisplayErrorContext(&e).to_string()))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| request_error(format!("failed to read body: {e}")))?;

        Ok(body.into_bytes())
    }

    /// Download an object to a local file
    pub async fn download_to_path(&self, key: &str, dest: &Path) -> Result<u64, S3Error> {
        let bytes = self.get_object(key).await?;
        let io_error = |source: std::io::Error| S3Error::Io {
            path: dest.display().to_string(),
            source,
        };

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(dest, &bytes).await.map_err(io_error)?;

        Ok(bytes.len() as u64)
    }
}
