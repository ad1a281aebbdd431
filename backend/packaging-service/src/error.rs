/// Error types for the packaging pipeline
///
/// Rendition-level failures are absorbed by the orchestrator and recorded on
/// the job; everything else terminates the run and lands in the report.
use std::collections::BTreeSet;
use std::path::PathBuf;
use video_core::LadderError;

/// Result type for packaging-service operations
pub type Result<T> = std::result::Result<T, PackagerError>;

#[derive(Debug, thiserror::Error)]
pub enum PackagerError {
    /// One rendition failed; recorded on its job, never aborts the ladder
    #[error("rendition {rendition} failed to encode: {reason}")]
    RenditionEncode { rendition: String, reason: String },

    /// Every rendition in the ladder failed
    #[error("all {} renditions failed to encode", .failures.len())]
    LadderExhausted { failures: Vec<(String, String)> },

    /// Manifest generation requested with no succeeded rendition
    #[error("no succeeded renditions available for the master playlist")]
    ManifestEmpty,

    /// The output tree handed to publishing has no master playlist
    #[error("master playlist not found under {0}")]
    ManifestMissing(PathBuf),

    /// An object exhausted its upload attempts
    #[error(
        "failed to publish {key} after {attempts} attempts ({uploaded_count} objects uploaded): {reason}"
    )]
    PublishObject {
        key: String,
        attempts: u32,
        reason: String,
        canonical_url: String,
        failed_keys: BTreeSet<String>,
        uploaded_count: usize,
    },

    /// Required collaborator configuration is absent
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid rendition ladder: {0}")]
    InvalidLadder(#[from] LadderError),

    /// Source acquisition failed; the pipeline never starts
    #[error("source unavailable: {0}")]
    Source(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PackagerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackagerError::Io {
            path: path.into(),
            source,
        }
    }

    /// Pipeline stage the error belongs to, as shown in run reports
    pub fn stage(&self) -> &'static str {
        match self {
            PackagerError::RenditionEncode { .. } | PackagerError::LadderExhausted { .. } => {
                "transcode"
            }
            PackagerError::ManifestEmpty => "manifest",
            PackagerError::ManifestMissing(_)
            | PackagerError::PublishObject { .. }
            | PackagerError::Configuration(_) => "publish",
            PackagerError::InvalidLadder(_) => "ladder",
            PackagerError::Source(_) => "source",
            PackagerError::Io { .. } => "io",
        }
    }

    /// Object keys that exhausted their retries, if any
    pub fn failed_keys(&self) -> Vec<String> {
        match self {
            PackagerError::PublishObject { failed_keys, .. } => {
                failed_keys.iter().cloned().collect()
            }
            _ => Vec::new(),
        }
    }
}
