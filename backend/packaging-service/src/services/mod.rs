/// Packaging services
///
/// Transcode -> manifest -> publish -> report, for one source video.
pub mod manifest;
pub mod publish;
pub mod report;
pub mod source;
pub mod transcode;

pub use manifest::{render_master_playlist, ManifestEntry, MasterPlaylist};
pub use publish::{PublishPipeline, PublishResult, PublishSettings};
pub use report::{ResultReporter, RunOutcome, RunReport};
pub use source::SourceAcquisition;
pub use transcode::{TranscodeOrchestrator, TranscodeSettings};

use crate::error::PackagerError;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use video_core::{RenditionJob, RenditionLadder};

/// End-to-end packaging of a single source into a published HLS tree
pub struct PackagingPipeline {
    ladder: RenditionLadder,
    orchestrator: TranscodeOrchestrator,
    publisher: PublishPipeline,
}

impl PackagingPipeline {
    pub fn new(
        ladder: RenditionLadder,
        orchestrator: TranscodeOrchestrator,
        publisher: PublishPipeline,
    ) -> Self {
        Self {
            ladder,
            orchestrator,
            publisher,
        }
    }

    /// Run every stage and summarize the outcome
    ///
    /// Never returns an error: every failure ends up in the report.
    pub async fn run(&self, source: &Path, remote_prefix: &str) -> RunReport {
        let output_root = self.orchestrator.settings().output_root.clone();
        let reporter = ResultReporter::start(source, &output_root);
        info!(run_id = %reporter.run_id(), source = %source.display(), "Packaging run started");

        let transcode = self.orchestrator.run(source, &self.ladder).await;
        if let Err(e) = transcode.check() {
            return finish_failed(reporter, transcode.jobs(), e);
        }
        let jobs = transcode.into_jobs();

        let manifest_path = match self.write_manifest(&jobs, &output_root).await {
            Ok(path) => path,
            Err(e) => return finish_failed(reporter, &jobs, e),
        };

        let result = self.publisher.publish(&output_root, remote_prefix).await;
        if let Err(e) = &result {
            error!(stage = e.stage(), error = %e, "Packaging run failed");
        }
        let report = reporter.finish(&jobs, Some(manifest_path), result);
        if report.is_success() {
            info!(run_id = %report.run_id, "Packaging run succeeded");
        }
        report
    }

    async fn write_manifest(
        &self,
        jobs: &[RenditionJob],
        output_root: &Path,
    ) -> Result<PathBuf, PackagerError> {
        let playlist = MasterPlaylist::from_jobs(jobs)?;
        playlist.write_to(output_root).await
    }
}

fn finish_failed(
    reporter: ResultReporter,
    jobs: &[RenditionJob],
    err: PackagerError,
) -> RunReport {
    error!(stage = err.stage(), error = %err, "Packaging run failed");
    reporter.finish(jobs, None, Err(err))
}
