/// Publish pipeline: mirror a finalized output tree into object storage
///
/// Every file under the root is uploaded to `<prefix>/<relative path>` with
/// bounded concurrency and linear-backoff retries. One object exhausting its
/// retries fails the whole publish; nothing new is scheduled after that.
pub mod content_type;
pub mod storage;

pub use content_type::ContentTypeTable;
pub use storage::{ObjectStorage, SourceFetcher, StorageError};

use crate::error::{PackagerError, Result};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use resilience::{with_retry, RetryConfig};
use s3_utils::S3Config;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use video_core::constants::MASTER_PLAYLIST_NAME;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub max_attempts: u32,
    /// Linear backoff unit: attempt `n` waits `n * base_delay`
    pub base_delay: Duration,
    pub concurrency: usize,
}

/// One file to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTask {
    pub local_path: PathBuf,
    pub remote_key: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    pub canonical_url: String,
    pub uploaded_count: usize,
    pub failed_keys: BTreeSet<String>,
}

#[derive(Debug)]
struct UploadFailure {
    key: String,
    attempts: u32,
    reason: String,
}

enum UploadOutcome {
    Uploaded,
    Skipped,
    Failed(UploadFailure),
}

pub struct PublishPipeline {
    storage: Arc<dyn ObjectStorage>,
    location: S3Config,
    content_types: ContentTypeTable,
    retry: RetryConfig,
    concurrency: usize,
}

impl PublishPipeline {
    pub fn new(storage: Arc<dyn ObjectStorage>, location: S3Config, settings: PublishSettings) -> Self {
        Self {
            storage,
            location,
            content_types: ContentTypeTable::default(),
            retry: RetryConfig::linear(settings.max_attempts, settings.base_delay),
            concurrency: settings.concurrency.max(1),
        }
    }

    pub fn with_content_types(mut self, content_types: ContentTypeTable) -> Self {
        self.content_types = content_types;
        self
    }

    /// Public URL of the master playlist, derived without network access
    pub fn canonical_url(&self, prefix: &str) -> Result<String> {
        if self.location.bucket().is_none() && self.location.base_url.is_none() {
            return Err(PackagerError::Configuration(
                "storage bucket is not configured (AWS_BUCKET_NAME)".to_string(),
            ));
        }
        self.location
            .object_url(&remote_key(prefix, Path::new(MASTER_PLAYLIST_NAME)))
            .ok_or_else(|| {
                PackagerError::Configuration("cannot derive a public URL for the master playlist".to_string())
            })
    }

    /// Upload every file under `root` to `<prefix>/...`
    pub async fn publish(&self, root: &Path, prefix: &str) -> Result<PublishResult> {
        if self.location.bucket().is_none() {
            return Err(PackagerError::Configuration(
                "storage bucket is not configured (AWS_BUCKET_NAME)".to_string(),
            ));
        }
        let canonical_url = self.canonical_url(prefix)?;

        let tasks = collect_tasks(root, prefix, &self.content_types).await?;
        let master_key = remote_key(prefix, Path::new(MASTER_PLAYLIST_NAME));
        if !tasks.iter().any(|task| task.remote_key == master_key) {
            return Err(PackagerError::ManifestMissing(root.to_path_buf()));
        }

        info!(
            root = %root.display(),
            prefix = %normalize_prefix(prefix),
            objects = tasks.len(),
            concurrency = self.concurrency,
            "Publishing output tree"
        );

        let abort = AtomicBool::new(false);
        let outcomes: Vec<UploadOutcome> = stream::iter(tasks)
            .map(|task| {
                let abort = &abort;
                async move {
                    if abort.load(Ordering::SeqCst) {
                        return UploadOutcome::Skipped;
                    }
                    match self.upload(&task).await {
                        Ok(()) => UploadOutcome::Uploaded,
                        Err(failure) => {
                            abort.store(true, Ordering::SeqCst);
                            UploadOutcome::Failed(failure)
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut uploaded_count = 0;
        let mut skipped = 0;
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                UploadOutcome::Uploaded => uploaded_count += 1,
                UploadOutcome::Skipped => skipped += 1,
                UploadOutcome::Failed(failure) => failures.push(failure),
            }
        }

        if failures.is_empty() {
            info!(
                uploaded = uploaded_count,
                url = %canonical_url,
                "Publish complete"
            );
            return Ok(PublishResult {
                canonical_url,
                uploaded_count,
                failed_keys: BTreeSet::new(),
            });
        }

        failures.sort_by(|a, b| a.key.cmp(&b.key));
        let failed_keys: BTreeSet<String> = failures.iter().map(|f| f.key.clone()).collect();
        warn!(
            uploaded = uploaded_count,
            skipped,
            failed = failed_keys.len(),
            "Publish aborted"
        );
        let first = failures.swap_remove(0);
        Err(PackagerError::PublishObject {
            key: first.key,
            attempts: first.attempts,
            reason: first.reason,
            canonical_url,
            failed_keys,
            uploaded_count,
        })
    }

    async fn upload(&self, task: &PublishTask) -> std::result::Result<(), UploadFailure> {
        let body = tokio::fs::read(&task.local_path)
            .await
            .map(Bytes::from)
            .map_err(|e| UploadFailure {
                key: task.remote_key.clone(),
                attempts: 0,
                reason: format!("failed to read {}: {e}", task.local_path.display()),
            })?;

        let attempts = AtomicU32::new(0);
        let storage = &self.storage;
        let result = with_retry(&self.retry, |attempt| {
            attempts.store(attempt, Ordering::Relaxed);
            let body = body.clone();
            async move {
                storage
                    .put(&task.remote_key, body, &task.content_type)
                    .await
            }
        })
        .await;

        match result {
            Ok(()) => {
                debug!(
                    key = %task.remote_key,
                    content_type = %task.content_type,
                    attempts = attempts.load(Ordering::Relaxed),
                    "Object uploaded"
                );
                Ok(())
            }
            Err(e) => {
                let attempts = e.attempts();
                Err(UploadFailure {
                    key: task.remote_key.clone(),
                    attempts,
                    reason: e.into_last_error().to_string(),
                })
            }
        }
    }
}

/// Strip leading/trailing separators so keys never start with or double `/`
pub fn normalize_prefix(prefix: &str) -> String {
    prefix
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Remote key for a path relative to the publish root, always `/`-separated
pub fn remote_key(prefix: &str, relative: &Path) -> String {
    let suffix = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let prefix = normalize_prefix(prefix);
    if prefix.is_empty() {
        suffix
    } else {
        format!("{}/{}", prefix, suffix)
    }
}

/// Walk `root` depth-first (sorted, files only) into upload tasks
pub async fn collect_tasks(
    root: &Path,
    prefix: &str,
    content_types: &ContentTypeTable,
) -> Result<Vec<PublishTask>> {
    let walk_root = root.to_path_buf();
    let files = tokio::task::spawn_blocking(move || list_files(&walk_root))
        .await
        .map_err(|e| PackagerError::io(root, std::io::Error::new(std::io::ErrorKind::Other, e)))??;

    Ok(files
        .into_iter()
        .map(|(local_path, relative)| PublishTask {
            remote_key: remote_key(prefix, &relative),
            content_type: content_types.classify(&relative).to_string(),
            local_path,
        })
        .collect())
}

fn list_files(root: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            PackagerError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| {
                PackagerError::io(
                    entry.path(),
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
                )
            })?
            .to_path_buf();
        files.push((entry.into_path(), relative));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/hls/movie/"), "hls/movie");
        assert_eq!(normalize_prefix("hls//movie"), "hls/movie");
        assert_eq!(normalize_prefix(""), "");
    }

    #[test]
    fn test_remote_key_uses_forward_slashes() {
        let relative: PathBuf = ["720p", "720p_segment000.ts"].iter().collect();
        assert_eq!(
            remote_key("hls/movie", &relative),
            "hls/movie/720p/720p_segment000.ts"
        );
        assert_eq!(remote_key("", Path::new("master.m3u8")), "master.m3u8");
    }

    #[tokio::test]
    async fn test_collect_tasks_files_only_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("720p")).unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::write(dir.path().join("master.m3u8"), "#EXTM3U\n").unwrap();
        std::fs::write(dir.path().join("720p/playlist.m3u8"), "#EXTM3U\n").unwrap();
        std::fs::write(dir.path().join("720p/720p_segment001.ts"), b"b").unwrap();
        std::fs::write(dir.path().join("720p/720p_segment000.ts"), b"a").unwrap();

        let tasks = collect_tasks(dir.path(), "hls/x", &ContentTypeTable::default())
            .await
            .unwrap();
        let keys: Vec<&str> = tasks.iter().map(|t| t.remote_key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "hls/x/720p/720p_segment000.ts",
                "hls/x/720p/720p_segment001.ts",
                "hls/x/720p/playlist.m3u8",
                "hls/x/master.m3u8",
            ]
        );
        assert_eq!(tasks[0].content_type, "video/mp2t");
        assert_eq!(tasks[3].content_type, "application/vnd.apple.mpegurl");
    }

    #[test]
    fn test_canonical_url_requires_location() {
        struct NoopStorage;
        #[async_trait::async_trait]
        impl ObjectStorage for NoopStorage {
            async fn put(&self, _: &str, _: Bytes, _: &str) -> std::result::Result<(), StorageError> {
                Ok(())
            }
        }

        let settings = PublishSettings {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            concurrency: 2,
        };
        let unconfigured = PublishPipeline::new(Arc::new(NoopStorage), S3Config::default(), settings.clone());
        assert!(matches!(
            unconfigured.canonical_url("hls/x"),
            Err(PackagerError::Configuration(_))
        ));

        let location = S3Config {
            bucket: Some("media".to_string()),
            region: "us-east-1".to_string(),
            ..Default::default()
        };
        let pipeline = PublishPipeline::new(Arc::new(NoopStorage), location, settings);
        assert_eq!(
            pipeline.canonical_url("/hls/x/").unwrap(),
            "https://media.s3.us-east-1.amazonaws.com/hls/x/master.m3u8"
        );
    }
}
