/// Encoder abstraction used by the transcode orchestrator
///
/// The orchestrator only talks to `EncoderAdapter`; the ffmpeg-backed
/// implementation lives in `ffmpeg.rs` and tests substitute in-memory fakes.
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use video_core::RenditionProfile;

/// Everything an encoder needs to produce one rendition
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub source: PathBuf,
    pub profile: Arc<RenditionProfile>,
    /// Directory segments and the rendition playlist are written into
    pub segment_dir: PathBuf,
    /// Where the rendition playlist must exist after a successful encode
    pub playlist_path: PathBuf,
    /// printf-style segment file pattern, e.g. `<dir>/720p_segment%03d.ts`
    pub segment_pattern: PathBuf,
    pub segment_seconds: u32,
}

impl EncodeRequest {
    pub fn rendition(&self) -> &str {
        &self.profile.name
    }
}

/// Progress and lifecycle notifications for a single rendition
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeEvent {
    Started {
        rendition: String,
        command: String,
    },
    Progress {
        rendition: String,
        /// Percent of the source duration processed, when the duration is known
        percent: Option<f64>,
        out_time: Duration,
    },
    Completed {
        rendition: String,
        playlist: PathBuf,
    },
    Failed {
        rendition: String,
        reason: String,
    },
}

impl EncodeEvent {
    pub fn rendition(&self) -> &str {
        match self {
            EncodeEvent::Started { rendition, .. }
            | EncodeEvent::Progress { rendition, .. }
            | EncodeEvent::Completed { rendition, .. }
            | EncodeEvent::Failed { rendition, .. } => rendition,
        }
    }
}

/// Channel handle an encoder reports progress through
///
/// Sends never fail the encode; a dropped receiver just discards events.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    rendition: String,
    tx: mpsc::UnboundedSender<EncodeEvent>,
}

impl ProgressSink {
    pub fn new(rendition: impl Into<String>, tx: mpsc::UnboundedSender<EncodeEvent>) -> Self {
        Self {
            rendition: rendition.into(),
            tx,
        }
    }

    pub fn started(&self, command: impl Into<String>) {
        let _ = self.tx.send(EncodeEvent::Started {
            rendition: self.rendition.clone(),
            command: command.into(),
        });
    }

    pub fn progress(&self, percent: Option<f64>, out_time: Duration) {
        let _ = self.tx.send(EncodeEvent::Progress {
            rendition: self.rendition.clone(),
            percent,
            out_time,
        });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to start encoder: {0}")]
    Spawn(String),

    #[error("encoder exited with {}: {stderr_tail}", exit_label(.code))]
    Exited {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("encoder timed out after {0:?}")]
    TimedOut(Duration),

    #[error("encoder reported success but {0} is missing")]
    MissingPlaylist(PathBuf),

    #[error("encoder I/O error: {0}")]
    Io(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// Produces one rendition's segments and playlist from a source file
#[async_trait]
pub trait EncoderAdapter: Send + Sync {
    /// Encode `request.source` into `request.segment_dir`
    ///
    /// Returns the rendition playlist path on success.
    async fn encode(
        &self,
        request: &EncodeRequest,
        progress: &ProgressSink,
    ) -> Result<PathBuf, EncodeError>;
}
