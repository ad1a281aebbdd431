/// Transcode orchestration
///
/// Drives every rung of a ladder through the encoder, records per-rendition
/// outcomes and absorbs rendition failures. The run only fails when no
/// rendition succeeded.
pub mod encoder;
pub mod ffmpeg;

pub use encoder::{EncodeError, EncodeEvent, EncodeRequest, EncoderAdapter, ProgressSink};
pub use ffmpeg::FfmpegEncoder;

use crate::error::{PackagerError, Result};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use video_core::constants::segment_pattern;
use video_core::{RenditionJob, RenditionLadder};

#[derive(Debug, Clone)]
pub struct TranscodeSettings {
    pub output_root: PathBuf,
    pub segment_seconds: u32,
    /// Renditions encoded at the same time; 1 means strictly sequential
    pub max_concurrent: usize,
}

/// Outcome of running a whole ladder, in ladder order
#[derive(Debug)]
pub struct TranscodeRun {
    jobs: Vec<RenditionJob>,
}

impl TranscodeRun {
    pub fn jobs(&self) -> &[RenditionJob] {
        &self.jobs
    }

    pub fn into_jobs(self) -> Vec<RenditionJob> {
        self.jobs
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &RenditionJob> {
        self.jobs.iter().filter(|job| job.is_succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &RenditionJob> {
        self.jobs.iter().filter(|job| !job.is_succeeded())
    }

    /// Run-level result: succeeded iff at least one rendition succeeded
    pub fn check(&self) -> Result<()> {
        if self.succeeded().next().is_some() {
            return Ok(());
        }
        let failures = self
            .jobs
            .iter()
            .map(|job| {
                (
                    job.name().to_string(),
                    job.last_error().unwrap_or("not attempted").to_string(),
                )
            })
            .collect();
        Err(PackagerError::LadderExhausted { failures })
    }
}

pub struct TranscodeOrchestrator {
    encoder: Arc<dyn EncoderAdapter>,
    settings: TranscodeSettings,
    event_tx: Option<broadcast::Sender<EncodeEvent>>,
}

impl TranscodeOrchestrator {
    pub fn new(encoder: Arc<dyn EncoderAdapter>, settings: TranscodeSettings) -> Self {
        Self {
            encoder,
            settings,
            event_tx: None,
        }
    }

    /// Forward every encode event to external subscribers
    pub fn with_events(mut self, event_tx: broadcast::Sender<EncodeEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn settings(&self) -> &TranscodeSettings {
        &self.settings
    }

    /// Encode every ladder rung from `source`
    ///
    /// Jobs are returned in ladder order regardless of concurrency. The
    /// output root belongs to this run: entries left by earlier runs are
    /// cleared first, and a failed rendition's directory is removed, so the
    /// tree only holds renditions that made it.
    pub async fn run(&self, source: &Path, ladder: &RenditionLadder) -> TranscodeRun {
        let root = &self.settings.output_root;
        info!(
            source = %source.display(),
            output_root = %root.display(),
            renditions = ladder.len(),
            concurrency = self.settings.max_concurrent,
            "Starting transcode"
        );

        clear_stale_output(root, ladder, source).await;

        let jobs: Vec<RenditionJob> = ladder
            .profiles()
            .iter()
            .map(|profile| RenditionJob::new(Arc::clone(profile), root))
            .collect();

        let jobs = stream::iter(jobs)
            .map(|job| self.process(job, source))
            .buffered(self.settings.max_concurrent.max(1))
            .collect::<Vec<_>>()
            .await;

        let run = TranscodeRun { jobs };
        info!(
            succeeded = run.succeeded().count(),
            failed = run.failed().count(),
            "Transcode finished"
        );
        run
    }

    async fn process(&self, mut job: RenditionJob, source: &Path) -> RenditionJob {
        let name = job.name().to_string();

        // Segments from an earlier encode of this rung must not survive
        remove_dir_if_present(job.segment_dir()).await;
        if let Err(e) = tokio::fs::create_dir_all(job.segment_dir()).await {
            let err = PackagerError::io(job.segment_dir(), e);
            self.record_failure(&mut job, err.to_string());
            return job;
        }

        if let Err(e) = job.start() {
            error!("Rendition {} could not start: {}", name, e);
            return job;
        }

        let request = EncodeRequest {
            source: source.to_path_buf(),
            profile: job.profile_arc(),
            segment_dir: job.segment_dir().to_path_buf(),
            playlist_path: job.target_playlist_path(),
            segment_pattern: job.segment_dir().join(segment_pattern(&name)),
            segment_seconds: self.settings.segment_seconds,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_events(rx, self.event_tx.clone()));
        let sink = ProgressSink::new(name.clone(), tx);

        let result = self.encoder.encode(&request, &sink).await;
        drop(sink);
        if let Err(e) = forwarder.await {
            debug!(rendition = %name, error = %e, "event forwarder ended abnormally");
        }

        match result {
            Ok(playlist) => {
                if let Err(e) = job.succeed(playlist.clone()) {
                    error!("Rendition {} could not complete: {}", name, e);
                    return job;
                }
                info!(rendition = %name, playlist = %playlist.display(), "Rendition complete");
                self.publish_event(EncodeEvent::Completed {
                    rendition: name,
                    playlist,
                });
            }
            Err(e) => {
                self.record_failure(&mut job, e.to_string());
                remove_dir_if_present(job.segment_dir()).await;
            }
        }
        job
    }

    fn record_failure(&self, job: &mut RenditionJob, reason: String) {
        let err = PackagerError::RenditionEncode {
            rendition: job.name().to_string(),
            reason: reason.clone(),
        };
        warn!(error = %err, "Rendition failed, continuing with remaining ladder");

        if let Err(e) = job.fail(reason.clone()) {
            error!("Rendition {} could not be marked failed: {}", job.name(), e);
        }
        self.publish_event(EncodeEvent::Failed {
            rendition: job.name().to_string(),
            reason,
        });
    }

    fn publish_event(&self, event: EncodeEvent) {
        if let Some(tx) = &self.event_tx {
            if tx.send(event).is_err() {
                debug!("No subscribers for transcode events");
            }
        }
    }
}

/// Log progress at whole-percent steps and rebroadcast every event
async fn forward_events(
    mut rx: mpsc::UnboundedReceiver<EncodeEvent>,
    event_tx: Option<broadcast::Sender<EncodeEvent>>,
) {
    let mut last_percent: Option<u32> = None;
    while let Some(event) = rx.recv().await {
        match &event {
            EncodeEvent::Started { rendition, command } => {
                info!(rendition = %rendition, "Encoding started");
                debug!(rendition = %rendition, command = %command, "Encoder command");
            }
            EncodeEvent::Progress {
                rendition,
                percent: Some(percent),
                ..
            } => {
                let whole = percent.floor() as u32;
                if last_percent != Some(whole) {
                    last_percent = Some(whole);
                    info!(rendition = %rendition, percent = whole, "Encoding progress");
                }
            }
            EncodeEvent::Progress {
                rendition,
                out_time,
                ..
            } => {
                debug!(rendition = %rendition, out_time = ?out_time, "Encoding progress");
            }
            EncodeEvent::Completed { .. } | EncodeEvent::Failed { .. } => {}
        }

        if let Some(tx) = &event_tx {
            let _ = tx.send(event);
        }
    }
}

async fn remove_dir_if_present(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "Removed rendition output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove rendition output"),
    }
}

/// Drop every root entry the ladder does not name, keeping the source if it
/// lives under the root
async fn clear_stale_output(root: &Path, ladder: &RenditionLadder, source: &Path) {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Cannot list output root");
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Cannot list output root");
                break;
            }
        };
        let path = entry.path();
        let named = entry
            .file_name()
            .to_str()
            .is_some_and(|name| ladder.get(name).is_some());
        if named || source.starts_with(&path) {
            continue;
        }

        let removed = match entry.file_type().await {
            Ok(kind) if kind.is_dir() => tokio::fs::remove_dir_all(&path).await,
            _ => tokio::fs::remove_file(&path).await,
        };
        match removed {
            Ok(()) => info!(path = %path.display(), "Removed stale output"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale output"),
        }
    }
}
