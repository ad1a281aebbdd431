/// Source acquisition
///
/// Resolves a verified, non-empty local source file before any encoding
/// starts. When `VIDEO_URL` points into the configured bucket the object is
/// downloaded to the input path; otherwise an existing local file is used.
use super::publish::SourceFetcher;
use crate::config::SourceConfig;
use crate::error::{PackagerError, Result};
use s3_utils::S3Config;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct SourceAcquisition {
    input_path: PathBuf,
    video_url: Option<String>,
    location: S3Config,
}

impl SourceAcquisition {
    pub fn new(source: &SourceConfig, location: &S3Config) -> Self {
        Self {
            input_path: source.input_path.clone(),
            video_url: source.video_url.clone(),
            location: location.clone(),
        }
    }

    /// Produce the local source path, downloading it first when possible
    pub async fn acquire(&self, fetcher: &dyn SourceFetcher) -> Result<PathBuf> {
        if let Some(parent) = self.input_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PackagerError::io(parent, e))?;
        }

        let Some(url) = self.video_url.as_deref() else {
            return match existing_size(&self.input_path).await {
                Some(size) => {
                    info!(path = %self.input_path.display(), size, "Using existing input file");
                    Ok(self.input_path.clone())
                }
                None => Err(PackagerError::Source("no input video available".to_string())),
            };
        };

        let downloaded = self.download(url, fetcher).await;
        if !downloaded && existing_size(&self.input_path).await.is_none() {
            return Err(PackagerError::Source(
                "download failed and no existing input file found".to_string(),
            ));
        }

        let size = tokio::fs::metadata(&self.input_path)
            .await
            .map_err(|e| PackagerError::io(&self.input_path, e))?
            .len();
        if size == 0 {
            if let Err(e) = tokio::fs::remove_file(&self.input_path).await {
                warn!(error = %e, "Failed to remove empty input file");
            }
            return Err(PackagerError::Source("downloaded file is empty".to_string()));
        }

        info!(path = %self.input_path.display(), size, "Source ready");
        Ok(self.input_path.clone())
    }

    async fn download(&self, url: &str, fetcher: &dyn SourceFetcher) -> bool {
        if self.location.bucket().is_none() {
            warn!("VIDEO_URL set but no bucket configured, skipping download");
            return false;
        }
        let Some(key) = self.location.key_from_url(url) else {
            warn!(url, "Could not extract object key from VIDEO_URL");
            return false;
        };

        info!(key = %key, dest = %self.input_path.display(), "Downloading source video");
        match fetcher.fetch(&key, &self.input_path).await {
            Ok(bytes) => {
                info!(key = %key, bytes, "Source download finished");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Source download failed");
                false
            }
        }
    }
}

async fn existing_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
        .filter(|len| *len > 0)
}
