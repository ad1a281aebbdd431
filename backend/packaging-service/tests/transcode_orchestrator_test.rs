//! Integration Tests: Transcode Orchestrator
//!
//! Coverage:
//! - Partial ladder: failed renditions are recorded and cleaned up
//! - Exhausted ladder is fatal
//! - Bounded-parallel execution keeps ladder order
//! - Pre-existing rendition directories are reused

mod common;

use common::fake_encoder::ScriptedEncoder;
use common::two_rung_ladder;
use packaging_service::services::transcode::{TranscodeOrchestrator, TranscodeSettings};
use packaging_service::PackagerError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use video_core::{JobState, RenditionLadder};

fn orchestrator(
    encoder: Arc<ScriptedEncoder>,
    root: &Path,
    max_concurrent: usize,
) -> TranscodeOrchestrator {
    TranscodeOrchestrator::new(
        encoder,
        TranscodeSettings {
            output_root: root.to_path_buf(),
            segment_seconds: 4,
            max_concurrent,
        },
    )
}

#[tokio::test]
async fn failed_rendition_does_not_abort_ladder() {
    let dir = tempfile::tempdir().unwrap();
    let encoder = Arc::new(ScriptedEncoder::new().failing("1080p", "Conversion failed!"));

    let run = orchestrator(encoder.clone(), dir.path(), 1)
        .run(Path::new("input.mp4"), &two_rung_ladder())
        .await;

    assert!(run.check().is_ok());
    assert_eq!(encoder.calls(), vec!["1080p", "720p"]);

    let jobs = run.jobs();
    assert_eq!(jobs[0].state(), JobState::Failed);
    assert!(jobs[0].last_error().unwrap().contains("Conversion failed!"));
    assert!(jobs[0].playlist_path().is_none());
    assert!(!dir.path().join("1080p").exists());

    assert_eq!(jobs[1].state(), JobState::Succeeded);
    assert_eq!(
        jobs[1].playlist_path(),
        Some(dir.path().join("720p/playlist.m3u8").as_path())
    );
    assert!(dir.path().join("720p/720p_segment000.ts").exists());
    assert!(dir.path().join("720p/720p_segment001.ts").exists());
}

#[tokio::test]
async fn all_renditions_failing_exhausts_ladder() {
    let dir = tempfile::tempdir().unwrap();
    let encoder = Arc::new(
        ScriptedEncoder::new()
            .failing("1080p", "out of memory")
            .failing("720p", "out of memory"),
    );

    let run = orchestrator(encoder, dir.path(), 1)
        .run(Path::new("input.mp4"), &two_rung_ladder())
        .await;

    assert_eq!(run.succeeded().count(), 0);
    match run.check() {
        Err(PackagerError::LadderExhausted { failures }) => {
            let names: Vec<&str> = failures.iter().map(|(name, _)| name.as_str()).collect();
            assert_eq!(names, vec!["1080p", "720p"]);
            assert!(failures.iter().all(|(_, reason)| reason.contains("out of memory")));
        }
        other => panic!("expected LadderExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn bounded_parallel_keeps_ladder_order() {
    let dir = tempfile::tempdir().unwrap();
    let encoder = Arc::new(ScriptedEncoder::new().with_delay(Duration::from_millis(30)));
    let ladder = RenditionLadder::default_ladder();

    let run = orchestrator(encoder.clone(), dir.path(), 2)
        .run(Path::new("input.mp4"), &ladder)
        .await;

    let names: Vec<&str> = run.jobs().iter().map(|job| job.name()).collect();
    assert_eq!(names, vec!["1080p", "720p", "480p", "360p", "240p", "144p"]);
    assert!(run.jobs().iter().all(|job| job.is_succeeded()));
    assert!(encoder.peak_concurrency() <= 2);
    assert_eq!(encoder.peak_concurrency(), 2);
}

#[tokio::test]
async fn sequential_mode_runs_one_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let encoder = Arc::new(ScriptedEncoder::new().with_delay(Duration::from_millis(5)));

    orchestrator(encoder.clone(), dir.path(), 1)
        .run(Path::new("input.mp4"), &two_rung_ladder())
        .await;

    assert_eq!(encoder.peak_concurrency(), 1);
}

#[tokio::test]
async fn existing_rendition_directory_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("720p")).unwrap();
    let encoder = Arc::new(ScriptedEncoder::new());

    let run = orchestrator(encoder, dir.path(), 1)
        .run(Path::new("input.mp4"), &two_rung_ladder())
        .await;

    assert_eq!(run.succeeded().count(), 2);
}
