/// Packaging Service - batch HLS packager
///
/// Acquires the source video, encodes the rendition ladder, writes the
/// master playlist, publishes the output tree and prints a JSON run report.
use anyhow::Context;
use packaging_service::logging::init_tracing;
use packaging_service::services::publish::PublishSettings;
use packaging_service::services::transcode::{FfmpegEncoder, TranscodeSettings};
use packaging_service::services::{
    PackagingPipeline, PublishPipeline, ResultReporter, RunReport, SourceAcquisition,
    TranscodeOrchestrator,
};
use packaging_service::Config;
use s3_utils::S3Client;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env();
    let reporter = ResultReporter::start(&config.source.input_path, &config.transcode.output_dir);
    let ladder = match config.load_ladder() {
        Ok(ladder) => ladder,
        Err(e) => {
            error!(stage = e.stage(), error = %e, "Failed to load rendition ladder");
            return emit(&reporter.abort(e));
        }
    };
    info!(
        renditions = ladder.len(),
        output_dir = %config.transcode.output_dir.display(),
        "Configuration loaded"
    );

    let s3 = S3Client::with_config(config.s3.clone()).await;
    let storage = Arc::new(s3.operations());

    let source = match SourceAcquisition::new(&config.source, &config.s3)
        .acquire(storage.as_ref())
        .await
    {
        Ok(path) => path,
        Err(e) => {
            error!(stage = e.stage(), error = %e, "Source acquisition failed");
            return emit(&reporter.abort(e));
        }
    };
    let prefix = match config.remote_prefix(&source) {
        Ok(prefix) => prefix,
        Err(e) => {
            error!(stage = e.stage(), error = %e, "Failed to determine remote prefix");
            return emit(&reporter.abort(e));
        }
    };

    tokio::fs::create_dir_all(&config.transcode.output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create output directory {}",
                config.transcode.output_dir.display()
            )
        })?;

    let encoder = Arc::new(FfmpegEncoder::new(
        &config.transcode.ffmpeg_path,
        &config.transcode.ffprobe_path,
        config.transcode.encode_timeout(),
    ));
    let orchestrator = TranscodeOrchestrator::new(
        encoder,
        TranscodeSettings {
            output_root: config.transcode.output_dir.clone(),
            segment_seconds: config.transcode.segment_seconds,
            max_concurrent: config.transcode.concurrency,
        },
    );
    let publisher = PublishPipeline::new(
        storage,
        config.s3.clone(),
        PublishSettings {
            max_attempts: config.publish.max_attempts,
            base_delay: config.publish.base_delay(),
            concurrency: config.publish.concurrency,
        },
    );

    let pipeline = PackagingPipeline::new(ladder, orchestrator, publisher);
    let report = pipeline.run(&source, &prefix).await;
    emit(&report)
}

/// Print the run report to stdout; a failed run exits non-zero
fn emit(report: &RunReport) -> anyhow::Result<()> {
    println!(
        "{}",
        report
            .to_json_pretty()
            .context("Failed to serialize run report")?
    );

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
