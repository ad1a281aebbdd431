use async_trait::async_trait;
use packaging_service::services::transcode::{
    EncodeError, EncodeRequest, EncoderAdapter, ProgressSink,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Encoder that writes a tiny HLS rendition, or fails on request
#[derive(Default)]
pub struct ScriptedEncoder {
    failures: HashMap<String, String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, rendition: &str, reason: &str) -> Self {
        self.failures.insert(rendition.to_string(), reason.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EncoderAdapter for ScriptedEncoder {
    async fn encode(
        &self,
        request: &EncodeRequest,
        progress: &ProgressSink,
    ) -> Result<PathBuf, EncodeError> {
        self.calls.lock().unwrap().push(request.rendition().to_string());
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        progress.started(format!("fake-encoder {}", request.rendition()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match self.failures.get(request.rendition()) {
            Some(reason) => {
                // partial output that the orchestrator must clean up
                let _ = std::fs::write(request.segment_dir.join("partial.ts"), b"junk");
                Err(EncodeError::Exited {
                    code: Some(1),
                    stderr_tail: reason.clone(),
                })
            }
            None => write_rendition(request, progress),
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn write_rendition(request: &EncodeRequest, progress: &ProgressSink) -> Result<PathBuf, EncodeError> {
    let pattern = request.segment_pattern.to_string_lossy().into_owned();
    let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-PLAYLIST-TYPE:VOD\n");
    for index in 0..2 {
        let segment = PathBuf::from(pattern.replace("%03d", &format!("{:03}", index)));
        std::fs::write(&segment, b"\x47segment").map_err(|e| EncodeError::Io(e.to_string()))?;
        let file_name = segment
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        playlist.push_str(&format!("#EXTINF:{}.0,\n{}\n", request.segment_seconds, file_name));
        progress.progress(
            Some((index + 1) as f64 * 50.0),
            Duration::from_secs(u64::from(request.segment_seconds) * (index + 1)),
        );
    }
    playlist.push_str("#EXT-X-ENDLIST\n");
    std::fs::write(&request.playlist_path, playlist).map_err(|e| EncodeError::Io(e.to_string()))?;
    Ok(request.playlist_path.clone())
}
