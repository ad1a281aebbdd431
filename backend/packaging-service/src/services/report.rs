/// Run report: the single externally visible summary of a packaging run
use super::publish::PublishResult;
use crate::error::PackagerError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use video_core::{JobState, RenditionJob};

#[derive(Debug, Clone, Serialize)]
pub struct RenditionStatus {
    pub name: String,
    pub state: JobState,
    pub resolution: String,
    pub bandwidth: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RenditionJob> for RenditionStatus {
    fn from(job: &RenditionJob) -> Self {
        let profile = job.profile();
        Self {
            name: profile.name.clone(),
            state: job.state(),
            resolution: profile.resolution.to_string(),
            bandwidth: profile.bandwidth_bits(),
            playlist_path: job.playlist_path().map(Path::to_path_buf),
            error: job.last_error().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    Succeeded,
    Failed {
        stage: String,
        error: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        failed_keys: Vec<String>,
    },
}

impl From<&PackagerError> for RunOutcome {
    fn from(err: &PackagerError) -> Self {
        RunOutcome::Failed {
            stage: err.stage().to_string(),
            error: err.to_string(),
            failed_keys: err.failed_keys(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source: PathBuf,
    pub output_root: PathBuf,
    pub renditions: Vec<RenditionStatus>,
    pub manifest_path: Option<PathBuf>,
    pub publish: Option<PublishResult>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded)
    }

    pub fn failed_renditions(&self) -> impl Iterator<Item = &RenditionStatus> {
        self.renditions
            .iter()
            .filter(|r| r.state == JobState::Failed)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Collects run metadata from start to finish
#[derive(Debug, Clone)]
pub struct ResultReporter {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    source: PathBuf,
    output_root: PathBuf,
}

impl ResultReporter {
    pub fn start(source: &Path, output_root: &Path) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            source: source.to_path_buf(),
            output_root: output_root.to_path_buf(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Report for a run that failed before any rendition was scheduled
    pub fn abort(self, err: PackagerError) -> RunReport {
        self.finish(&[], None, Err(err))
    }

    /// Aggregate job statuses, manifest path and publish outcome
    pub fn finish(
        self,
        jobs: &[RenditionJob],
        manifest_path: Option<PathBuf>,
        result: Result<PublishResult, PackagerError>,
    ) -> RunReport {
        let (publish, outcome) = match result {
            Ok(publish) => (Some(publish), RunOutcome::Succeeded),
            Err(err) => (partial_publish(&err), RunOutcome::from(&err)),
        };

        RunReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            source: self.source,
            output_root: self.output_root,
            renditions: jobs.iter().map(RenditionStatus::from).collect(),
            manifest_path,
            publish,
            outcome,
        }
    }
}

/// What an aborted publish still managed to do
fn partial_publish(err: &PackagerError) -> Option<PublishResult> {
    match err {
        PackagerError::PublishObject {
            canonical_url,
            failed_keys,
            uploaded_count,
            ..
        } => Some(PublishResult {
            canonical_url: canonical_url.clone(),
            uploaded_count: *uploaded_count,
            failed_keys: failed_keys.clone(),
        }),
        _ => None,
    }
}
