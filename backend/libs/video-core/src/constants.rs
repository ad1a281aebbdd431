//! Packaging layout constants

/// Multi-variant playlist written at the output root
pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";

/// Per-rendition media playlist
pub const RENDITION_PLAYLIST_NAME: &str = "playlist.m3u8";

/// Segment file extension (MPEG-TS)
pub const SEGMENT_EXTENSION: &str = "ts";

/// HLS protocol version declared in the master playlist
pub const HLS_VERSION: u8 = 3;

/// Default segment duration in seconds
pub const DEFAULT_SEGMENT_SECONDS: u32 = 4;

/// Encoder timeout (60 minutes)
pub const FFMPEG_TIMEOUT_SECS: u64 = 60 * 60;

/// Upload attempts per object
pub const DEFAULT_PUBLISH_MAX_ATTEMPTS: u32 = 3;

/// Linear backoff base delay between upload attempts
pub const DEFAULT_PUBLISH_BASE_DELAY_MS: u64 = 1000;

/// Maximum concurrent uploads
pub const DEFAULT_PUBLISH_CONCURRENCY: usize = 4;

/// Maximum concurrent encodes (1 = strictly sequential)
pub const DEFAULT_TRANSCODE_CONCURRENCY: usize = 1;

/// ffmpeg segment filename pattern for a rendition, e.g. `720p_segment%03d.ts`
pub fn segment_pattern(rendition_name: &str) -> String {
    format!("{}_segment%03d.{}", rendition_name, SEGMENT_EXTENSION)
}

/// Playlist path relative to the output root, always forward-slash separated
pub fn relative_playlist_path(rendition_name: &str) -> String {
    format!("{}/{}", rendition_name, RENDITION_PLAYLIST_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_pattern() {
        assert_eq!(segment_pattern("720p"), "720p_segment%03d.ts");
    }

    #[test]
    fn test_relative_playlist_path() {
        assert_eq!(relative_playlist_path("1080p"), "1080p/playlist.m3u8");
    }
}
