//! Core rendition data models

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::constants::RENDITION_PLAYLIST_NAME;

/// Errors raised while building or validating a rendition ladder
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LadderError {
    #[error("ladder has no renditions")]
    Empty,
    #[error("duplicate rendition name: {0}")]
    DuplicateName(String),
    #[error("invalid rendition name {0:?}: must be a single non-empty path component")]
    InvalidName(String),
    #[error("invalid bitrate {0:?}: expected digits followed by a unit suffix (k or M)")]
    BitrateFormat(String),
    #[error("unsupported bitrate unit in {0:?}: only k (kilobits) and M (megabits) are accepted")]
    BitrateUnit(String),
    #[error("bitrate must be greater than zero: {0:?}")]
    ZeroBitrate(String),
    #[error("invalid resolution {0:?}: expected WIDTHxHEIGHT")]
    Resolution(String),
    #[error("failed to read ladder: {0}")]
    Load(String),
}

/// Bitrate stored in kilobits per second
///
/// Parsed from encoder-style strings such as `"5000k"` or `"5M"`. The unit
/// suffix is mandatory so `"5000"` is rejected rather than guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bitrate {
    kbps: u32,
}

impl Bitrate {
    pub fn from_kbps(kbps: u32) -> Result<Self, LadderError> {
        if kbps == 0 {
            return Err(LadderError::ZeroBitrate(format!("{kbps}k")));
        }
        Ok(Self { kbps })
    }

    pub fn kbps(&self) -> u32 {
        self.kbps
    }

    /// Bits per second, as declared in `BANDWIDTH=` attributes
    pub fn bits_per_second(&self) -> u64 {
        u64::from(self.kbps) * 1000
    }
}

impl FromStr for Bitrate {
    type Err = LadderError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        let split = value
            .trim_end_matches(|c: char| c.is_ascii_alphabetic())
            .len();
        let (digits, unit) = value.split_at(split);
        if unit.is_empty() {
            return Err(LadderError::BitrateUnit(raw.to_string()));
        }
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LadderError::BitrateFormat(raw.to_string()));
        }

        let amount: u32 = digits
            .parse()
            .map_err(|_| LadderError::BitrateFormat(raw.to_string()))?;
        let kbps = match unit {
            "k" | "K" => Some(amount),
            "M" | "m" => amount.checked_mul(1000),
            _ => return Err(LadderError::BitrateUnit(raw.to_string())),
        }
        .ok_or_else(|| LadderError::BitrateFormat(raw.to_string()))?;

        if kbps == 0 {
            return Err(LadderError::ZeroBitrate(raw.to_string()));
        }
        Ok(Self { kbps })
    }
}

impl TryFrom<String> for Bitrate {
    type Error = LadderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Bitrate> for String {
    fn from(value: Bitrate) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.kbps)
    }
}

/// Pixel resolution, written as `WIDTHxHEIGHT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Result<Self, LadderError> {
        if width == 0 || height == 0 {
            return Err(LadderError::Resolution(format!("{width}x{height}")));
        }
        Ok(Self { width, height })
    }
}

impl FromStr for Resolution {
    type Err = LadderError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (w, h) = raw
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| LadderError::Resolution(raw.to_string()))?;
        let width = w
            .parse()
            .map_err(|_| LadderError::Resolution(raw.to_string()))?;
        let height = h
            .parse()
            .map_err(|_| LadderError::Resolution(raw.to_string()))?;
        Self::new(width, height).map_err(|_| LadderError::Resolution(raw.to_string()))
    }
}

impl TryFrom<String> for Resolution {
    type Error = LadderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One rung of the ladder: target resolution, bitrates and encoder constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionProfile {
    pub name: String, // e.g., "720p"
    pub resolution: Resolution,
    pub video_bitrate: Bitrate,
    pub audio_bitrate: Bitrate,
    #[serde(rename = "profile")]
    pub encoder_profile: String, // "high", "main", "baseline"
    #[serde(rename = "level")]
    pub encoder_level: String, // "4.0", "3.1"
    #[serde(rename = "maxrate")]
    pub max_rate: Bitrate,
    #[serde(rename = "bufsize")]
    pub buf_size: Bitrate,
}

impl RenditionProfile {
    /// Build a profile from encoder-style strings
    #[allow(clippy::too_many_arguments)]
    pub fn parse(
        name: &str,
        resolution: &str,
        video_bitrate: &str,
        audio_bitrate: &str,
        encoder_profile: &str,
        encoder_level: &str,
        max_rate: &str,
        buf_size: &str,
    ) -> Result<Self, LadderError> {
        Ok(Self {
            name: name.to_string(),
            resolution: resolution.parse()?,
            video_bitrate: video_bitrate.parse()?,
            audio_bitrate: audio_bitrate.parse()?,
            encoder_profile: encoder_profile.to_string(),
            encoder_level: encoder_level.to_string(),
            max_rate: max_rate.parse()?,
            buf_size: buf_size.parse()?,
        })
    }

    /// Peak bandwidth advertised for this rendition in the master playlist
    pub fn bandwidth_bits(&self) -> u64 {
        self.video_bitrate.bits_per_second()
    }

    fn validate_name(&self) -> Result<(), LadderError> {
        let name = self.name.as_str();
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && name.trim() == name;
        if valid {
            Ok(())
        } else {
            Err(LadderError::InvalidName(self.name.clone()))
        }
    }
}

/// Ordered, validated set of rendition profiles
///
/// Profiles are shared read-only with every job created from the ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RenditionProfile>", into = "Vec<RenditionProfile>")]
pub struct RenditionLadder {
    profiles: Vec<Arc<RenditionProfile>>,
}

impl RenditionLadder {
    pub fn new(profiles: Vec<RenditionProfile>) -> Result<Self, LadderError> {
        if profiles.is_empty() {
            return Err(LadderError::Empty);
        }

        let mut seen = HashSet::with_capacity(profiles.len());
        for profile in &profiles {
            profile.validate_name()?;
            if !seen.insert(profile.name.as_str()) {
                return Err(LadderError::DuplicateName(profile.name.clone()));
            }
        }

        Ok(Self {
            profiles: profiles.into_iter().map(Arc::new).collect(),
        })
    }

    /// Six-rung H.264 ladder, highest quality first
    pub fn default_ladder() -> Self {
        let profiles = vec![
            rung("1080p", (1920, 1080), 5000, 192, "high", "4.0", 5350, 7500),
            rung("720p", (1280, 720), 2500, 128, "main", "3.1", 2675, 4000),
            rung("480p", (854, 480), 1000, 96, "main", "3.0", 1070, 1500),
            rung("360p", (640, 360), 600, 96, "main", "3.0", 640, 900),
            rung("240p", (426, 240), 400, 64, "baseline", "3.0", 432, 600),
            rung("144p", (256, 144), 200, 48, "baseline", "3.0", 216, 300),
        ];

        Self {
            profiles: profiles.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, LadderError> {
        serde_json::from_str(raw).map_err(|e| LadderError::Load(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, LadderError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LadderError::Load(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    pub fn profiles(&self) -> &[Arc<RenditionProfile>] {
        &self.profiles
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RenditionProfile>> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl TryFrom<Vec<RenditionProfile>> for RenditionLadder {
    type Error = LadderError;

    fn try_from(value: Vec<RenditionProfile>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RenditionLadder> for Vec<RenditionProfile> {
    fn from(value: RenditionLadder) -> Self {
        value
            .profiles
            .into_iter()
            .map(|p| Arc::try_unwrap(p).unwrap_or_else(|shared| (*shared).clone()))
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn rung(
    name: &str,
    (width, height): (u32, u32),
    video_kbps: u32,
    audio_kbps: u32,
    encoder_profile: &str,
    encoder_level: &str,
    max_rate_kbps: u32,
    buf_size_kbps: u32,
) -> RenditionProfile {
    RenditionProfile {
        name: name.to_string(),
        resolution: Resolution { width, height },
        video_bitrate: Bitrate { kbps: video_kbps },
        audio_bitrate: Bitrate { kbps: audio_kbps },
        encoder_profile: encoder_profile.to_string(),
        encoder_level: encoder_level.to_string(),
        max_rate: Bitrate { kbps: max_rate_kbps },
        buf_size: Bitrate { kbps: buf_size_kbps },
    }
}

/// Lifecycle of a single rendition encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition for rendition {rendition}: {from} -> {to}")]
pub struct TransitionError {
    pub rendition: String,
    pub from: JobState,
    pub to: JobState,
}

/// Per-run state for one rendition
///
/// Only `start`, `succeed` and `fail` mutate a job, and only along
/// Pending -> Running -> {Succeeded, Failed}.
#[derive(Debug, Clone)]
pub struct RenditionJob {
    profile: Arc<RenditionProfile>,
    state: JobState,
    segment_dir: PathBuf,
    playlist_path: Option<PathBuf>,
    last_error: Option<String>,
}

impl RenditionJob {
    pub fn new(profile: Arc<RenditionProfile>, output_root: &Path) -> Self {
        let segment_dir = output_root.join(&profile.name);
        Self {
            profile,
            state: JobState::Pending,
            segment_dir,
            playlist_path: None,
            last_error: None,
        }
    }

    pub fn profile(&self) -> &RenditionProfile {
        &self.profile
    }

    /// Shared handle to the profile, for handing to an encoder
    pub fn profile_arc(&self) -> Arc<RenditionProfile> {
        Arc::clone(&self.profile)
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn segment_dir(&self) -> &Path {
        &self.segment_dir
    }

    /// Expected playlist location inside the segment directory
    pub fn target_playlist_path(&self) -> PathBuf {
        self.segment_dir.join(RENDITION_PLAYLIST_NAME)
    }

    pub fn playlist_path(&self) -> Option<&Path> {
        self.playlist_path.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_succeeded(&self) -> bool {
        self.state == JobState::Succeeded
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobState::Pending, JobState::Running)
    }

    pub fn succeed(&mut self, playlist_path: PathBuf) -> Result<(), TransitionError> {
        self.transition(JobState::Running, JobState::Succeeded)?;
        self.playlist_path = Some(playlist_path);
        Ok(())
    }

    /// Record a failure. A job may fail before it started running (e.g. its
    /// directory could not be created).
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(self.illegal(JobState::Failed));
        }
        self.state = JobState::Failed;
        self.last_error = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, from: JobState, to: JobState) -> Result<(), TransitionError> {
        if self.state != from {
            return Err(self.illegal(to));
        }
        self.state = to;
        Ok(())
    }

    fn illegal(&self, to: JobState) -> TransitionError {
        TransitionError {
            rendition: self.profile.name.clone(),
            from: self.state,
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_kilo_suffix() {
        let bitrate: Bitrate = "5000k".parse().unwrap();
        assert_eq!(bitrate.kbps(), 5000);
        assert_eq!(bitrate.bits_per_second(), 5_000_000);
        assert_eq!(bitrate.to_string(), "5000k");
    }

    #[test]
    fn test_bitrate_mega_suffix() {
        let bitrate: Bitrate = "5M".parse().unwrap();
        assert_eq!(bitrate.kbps(), 5000);
    }

    #[test]
    fn test_bitrate_rejects_missing_or_unknown_unit() {
        assert!(matches!("5000".parse::<Bitrate>(), Err(LadderError::BitrateUnit(_))));
        assert!(matches!("5000b".parse::<Bitrate>(), Err(LadderError::BitrateUnit(_))));
        assert!(matches!("k".parse::<Bitrate>(), Err(LadderError::BitrateFormat(_))));
        assert!(matches!("5.5M".parse::<Bitrate>(), Err(LadderError::BitrateFormat(_))));
        assert!(matches!("-5k".parse::<Bitrate>(), Err(LadderError::BitrateFormat(_))));
        assert!(matches!("0k".parse::<Bitrate>(), Err(LadderError::ZeroBitrate(_))));
    }

    #[test]
    fn test_resolution_parse() {
        let res: Resolution = "1280x720".parse().unwrap();
        assert_eq!((res.width, res.height), (1280, 720));
        assert_eq!(res.to_string(), "1280x720");
        assert!("1280".parse::<Resolution>().is_err());
        assert!("0x720".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_default_ladder() {
        let ladder = RenditionLadder::default_ladder();
        assert_eq!(ladder.len(), 6);
        assert_eq!(ladder.profiles()[0].name, "1080p");
        assert_eq!(ladder.profiles()[0].bandwidth_bits(), 5_000_000);
        assert_eq!(ladder.profiles()[5].name, "144p");
        assert_eq!(ladder.get("720p").unwrap().max_rate.kbps(), 2675);
    }

    #[test]
    fn test_ladder_rejects_duplicates() {
        let p = RenditionProfile::parse("720p", "1280x720", "2500k", "128k", "main", "3.1", "2675k", "4000k")
            .unwrap();
        let result = RenditionLadder::new(vec![p.clone(), p]);
        assert_eq!(result, Err(LadderError::DuplicateName("720p".to_string())));
    }

    #[test]
    fn test_ladder_rejects_path_like_names() {
        let mut p = RenditionProfile::parse("720p", "1280x720", "2500k", "128k", "main", "3.1", "2675k", "4000k")
            .unwrap();
        p.name = "../720p".to_string();
        assert!(matches!(
            RenditionLadder::new(vec![p]),
            Err(LadderError::InvalidName(_))
        ));
        assert_eq!(RenditionLadder::new(Vec::new()), Err(LadderError::Empty));
    }

    #[test]
    fn test_ladder_from_json() {
        let raw = r#"[
            {"name":"720p","resolution":"1280x720","video_bitrate":"2500k","audio_bitrate":"128k",
             "profile":"main","level":"3.1","maxrate":"2675k","bufsize":"4000k"}
        ]"#;
        let ladder = RenditionLadder::from_json_str(raw).unwrap();
        assert_eq!(ladder.len(), 1);
        assert_eq!(ladder.profiles()[0].encoder_level, "3.1");

        let bad = raw.replace("2500k", "2500");
        assert!(matches!(
            RenditionLadder::from_json_str(&bad),
            Err(LadderError::Load(_))
        ));
    }

    #[test]
    fn test_job_state_transitions() {
        let ladder = RenditionLadder::default_ladder();
        let mut job = RenditionJob::new(ladder.profiles()[1].clone(), Path::new("/out"));
        assert_eq!(job.state(), JobState::Pending);
        assert_eq!(job.segment_dir(), Path::new("/out/720p"));

        assert!(job.succeed(PathBuf::from("/out/720p/playlist.m3u8")).is_err());
        job.start().unwrap();
        assert_eq!(job.state(), JobState::Running);
        job.succeed(job.target_playlist_path()).unwrap();
        assert!(job.is_succeeded());
        assert_eq!(job.playlist_path(), Some(Path::new("/out/720p/playlist.m3u8")));

        // Terminal states are final
        assert!(job.fail("late error").is_err());
        assert!(job.start().is_err());
    }

    #[test]
    fn test_job_can_fail_before_running() {
        let ladder = RenditionLadder::default_ladder();
        let mut job = RenditionJob::new(ladder.profiles()[0].clone(), Path::new("/out"));
        job.fail("mkdir failed").unwrap();
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.last_error(), Some("mkdir failed"));
        assert!(job.playlist_path().is_none());
    }
}
