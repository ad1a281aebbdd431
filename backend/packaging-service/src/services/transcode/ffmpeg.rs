/// ffmpeg-backed `EncoderAdapter`
///
/// Runs one ffmpeg process per rendition with `-progress pipe:1` so progress
/// can be streamed back while segments are written. The source duration is
/// probed once with ffprobe to turn `out_time` into a percentage.
use super::encoder::{EncodeError, EncodeRequest, EncoderAdapter, ProgressSink};
use async_trait::async_trait;
use resilience::{with_timeout_result, TimeoutError};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// stderr lines kept for failure reports
const STDERR_TAIL_LINES: usize = 20;

pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Duration,
    durations: Mutex<HashMap<PathBuf, Option<f64>>>,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            timeout,
            durations: Mutex::new(HashMap::new()),
        }
    }

    /// Source duration in seconds, probed once per source
    async fn source_duration(&self, source: &Path) -> Option<f64> {
        if let Some(cached) = self.cached_duration(source) {
            return cached;
        }

        let probed = self.probe_duration(source).await;
        if let Ok(mut cache) = self.durations.lock() {
            cache.insert(source.to_path_buf(), probed);
        }
        probed
    }

    fn cached_duration(&self, source: &Path) -> Option<Option<f64>> {
        self.durations.lock().ok()?.get(source).copied()
    }

    async fn probe_duration(&self, source: &Path) -> Option<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(source)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let duration = parse_duration(&String::from_utf8_lossy(&output.stdout));
                if duration.is_none() {
                    warn!(source = %source.display(), "ffprobe returned no usable duration");
                }
                duration
            }
            Ok(output) => {
                warn!(
                    source = %source.display(),
                    status = ?output.status.code(),
                    "ffprobe failed, progress will be reported without percentages"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "ffprobe unavailable, progress will be reported without percentages");
                None
            }
        }
    }

    async fn run(
        &self,
        args: &[String],
        progress: &ProgressSink,
        duration: Option<f64>,
    ) -> Result<(), EncodeError> {
        let mut child = Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EncodeError::Spawn(format!("{}: {e}", self.ffmpeg.display())))?;

        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(stderr_tail(stderr)));

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| EncodeError::Io(e.to_string()))?
            {
                if let Some(out_time) = parse_out_time(&line) {
                    progress.progress(percent_complete(out_time, duration), out_time);
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| EncodeError::Io(e.to_string()))?;

        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            debug!(status = ?status.code(), "ffmpeg finished");
            Ok(())
        } else {
            Err(EncodeError::Exited {
                code: status.code(),
                stderr_tail,
            })
        }
    }
}

#[async_trait]
impl EncoderAdapter for FfmpegEncoder {
    async fn encode(
        &self,
        request: &EncodeRequest,
        progress: &ProgressSink,
    ) -> Result<PathBuf, EncodeError> {
        let duration = self.source_duration(&request.source).await;
        let args = build_args(request);
        progress.started(format!("{} {}", self.ffmpeg.display(), args.join(" ")));

        match with_timeout_result(self.timeout, self.run(&args, progress, duration)).await {
            Ok(()) => {}
            Err(TimeoutError::Elapsed(elapsed)) => return Err(EncodeError::TimedOut(elapsed)),
            Err(TimeoutError::Failed(e)) => return Err(e),
        }

        if tokio::fs::metadata(&request.playlist_path).await.is_err() {
            return Err(EncodeError::MissingPlaylist(request.playlist_path.clone()));
        }
        Ok(request.playlist_path.clone())
    }
}

/// ffmpeg arguments for one rendition: H.264 + stereo AAC into VOD HLS
pub fn build_args(request: &EncodeRequest) -> Vec<String> {
    let profile = &request.profile;
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-y".into(),
        "-i".into(),
        request.source.to_string_lossy().into_owned(),
        "-c:v".into(),
        "libx264".into(),
        "-profile:v".into(),
        profile.encoder_profile.clone(),
        "-level:v".into(),
        profile.encoder_level.clone(),
        "-vf".into(),
        format!(
            "scale={}:{}",
            profile.resolution.width, profile.resolution.height
        ),
        "-b:v".into(),
        profile.video_bitrate.to_string(),
        "-maxrate".into(),
        profile.max_rate.to_string(),
        "-bufsize".into(),
        profile.buf_size.to_string(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        profile.audio_bitrate.to_string(),
        "-ac".into(),
        "2".into(),
    ];

    args.extend([
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        request.segment_seconds.to_string(),
        "-hls_playlist_type".into(),
        "vod".into(),
        "-hls_flags".into(),
        "independent_segments".into(),
        "-hls_segment_type".into(),
        "mpegts".into(),
        "-hls_segment_filename".into(),
        request.segment_pattern.to_string_lossy().into_owned(),
        "-hls_list_size".into(),
        "0".into(),
        "-progress".into(),
        "pipe:1".into(),
        "-nostats".into(),
        request.playlist_path.to_string_lossy().into_owned(),
    ]);
    args
}

/// Parse `out_time_us=` / `out_time_ms=` lines from `-progress` output
///
/// Both keys carry microseconds.
fn parse_out_time(line: &str) -> Option<Duration> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value.parse::<u64>().ok().map(Duration::from_micros),
        _ => None,
    }
}

fn parse_duration(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}

fn percent_complete(out_time: Duration, duration: Option<f64>) -> Option<f64> {
    let duration = duration?;
    Some((out_time.as_secs_f64() / duration * 100.0).clamp(0.0, 100.0))
}

async fn stderr_tail<R: AsyncRead + Unpin>(reader: R) -> String {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}
