/// Configuration management for packaging-service
///
/// Loads configuration from environment variables with sensible defaults.
/// Malformed numeric values fall back to their default with a warning.
use crate::error::{PackagerError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use video_core::constants::{
    DEFAULT_PUBLISH_BASE_DELAY_MS, DEFAULT_PUBLISH_CONCURRENCY, DEFAULT_PUBLISH_MAX_ATTEMPTS,
    DEFAULT_SEGMENT_SECONDS, DEFAULT_TRANSCODE_CONCURRENCY, FFMPEG_TIMEOUT_SECS,
};
use video_core::RenditionLadder;

pub use s3_utils::S3Config;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub transcode: TranscodeConfig,
    pub publish: PublishConfig,
    pub s3: S3Config,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SourceConfig {
    /// Local path the source video is read from (and downloaded to)
    pub input_path: PathBuf,
    /// Optional remote location of the source
    pub video_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TranscodeConfig {
    pub output_dir: PathBuf,
    /// JSON ladder file; the built-in ladder is used when unset
    pub ladder_path: Option<PathBuf>,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub segment_seconds: u32,
    pub encode_timeout_secs: u64,
    pub concurrency: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PublishConfig {
    /// Remote key prefix; defaults to `hls/<source stem>`
    pub prefix: Option<String>,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Config {
            source: SourceConfig {
                input_path: std::env::var("INPUT_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./input/input.mp4")),
                video_url: non_empty_var("VIDEO_URL"),
            },
            transcode: TranscodeConfig {
                output_dir: std::env::var("OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./output")),
                ladder_path: non_empty_var("LADDER_PATH").map(PathBuf::from),
                ffmpeg_path: std::env::var("FFMPEG_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
                ffprobe_path: std::env::var("FFPROBE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("ffprobe")),
                segment_seconds: positive_var("HLS_SEGMENT_SECONDS", DEFAULT_SEGMENT_SECONDS),
                encode_timeout_secs: positive_var("ENCODE_TIMEOUT_SECS", FFMPEG_TIMEOUT_SECS),
                concurrency: positive_var("TRANSCODE_CONCURRENCY", DEFAULT_TRANSCODE_CONCURRENCY),
            },
            publish: PublishConfig {
                prefix: non_empty_var("S3_PREFIX"),
                max_attempts: positive_var("PUBLISH_MAX_ATTEMPTS", DEFAULT_PUBLISH_MAX_ATTEMPTS),
                base_delay_ms: parse_var("PUBLISH_BASE_DELAY_MS", DEFAULT_PUBLISH_BASE_DELAY_MS),
                concurrency: positive_var("PUBLISH_CONCURRENCY", DEFAULT_PUBLISH_CONCURRENCY),
            },
            s3: S3Config::from_env(),
        }
    }

    /// Rendition ladder from `LADDER_PATH`, or the built-in six-rung ladder
    pub fn load_ladder(&self) -> Result<RenditionLadder> {
        match &self.transcode.ladder_path {
            Some(path) => Ok(RenditionLadder::from_json_file(path)?),
            None => Ok(RenditionLadder::default_ladder()),
        }
    }

    /// Remote prefix the output tree is published under
    pub fn remote_prefix(&self, source: &Path) -> Result<String> {
        if let Some(prefix) = &self.publish.prefix {
            return Ok(prefix.clone());
        }
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                PackagerError::Configuration(format!(
                    "cannot derive a remote prefix from {}; set S3_PREFIX",
                    source.display()
                ))
            })?;
        Ok(format!("hls/{}", stem))
    }
}

impl TranscodeConfig {
    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }
}

impl PublishConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => parse_or_default(name, &raw, default),
        Err(_) => default,
    }
}

/// Like `parse_var`, but zero is clamped to one
fn positive_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display + PartialEq + From<u8>,
{
    let value = parse_var(name, default);
    if value == T::from(0) {
        warn!(variable = name, "zero is not allowed, using 1");
        T::from(1)
    } else {
        value
    }
}

fn parse_or_default<T>(name: &str, raw: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    raw.trim().parse().unwrap_or_else(|_| {
        warn!(
            variable = name,
            value = raw,
            default = %default,
            "invalid value, falling back to default"
        );
        default
    })
}
