/// HLS master playlist generation
///
/// The master playlist is a pure function of the finalized job set: one
/// `EXT-X-STREAM-INF` entry per succeeded rendition, in orchestrator order.
use crate::error::{PackagerError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use video_core::constants::{relative_playlist_path, HLS_VERSION, MASTER_PLAYLIST_NAME};
use video_core::{RenditionJob, Resolution};

/// One variant stream in the master playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Peak bandwidth in bits per second
    pub bandwidth_bits: u64,
    pub resolution: Resolution,
    pub relative_playlist_path: String,
}

impl ManifestEntry {
    /// Entry for a succeeded job; `None` for anything else
    pub fn from_job(job: &RenditionJob) -> Option<Self> {
        if !job.is_succeeded() {
            return None;
        }
        let profile = job.profile();
        Some(Self {
            bandwidth_bits: profile.bandwidth_bits(),
            resolution: profile.resolution,
            relative_playlist_path: relative_playlist_path(&profile.name),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterPlaylist {
    entries: Vec<ManifestEntry>,
}

impl MasterPlaylist {
    /// Build from a resolved job set, skipping anything not succeeded
    ///
    /// Fails with `ManifestEmpty` rather than emitting a header-only playlist.
    pub fn from_jobs(jobs: &[RenditionJob]) -> Result<Self> {
        let entries: Vec<ManifestEntry> = jobs.iter().filter_map(ManifestEntry::from_job).collect();
        if entries.is_empty() {
            return Err(PackagerError::ManifestEmpty);
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn render(&self) -> String {
        let mut playlist = String::from("#EXTM3U\n");
        playlist.push_str(&format!("#EXT-X-VERSION:{}\n", HLS_VERSION));

        for entry in &self.entries {
            playlist.push_str(&format!(
                "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n",
                entry.bandwidth_bits, entry.resolution
            ));
            playlist.push_str(&entry.relative_playlist_path);
            playlist.push('\n');
        }
        playlist
    }

    /// Write `master.m3u8` under `output_root`
    ///
    /// Written to a temporary sibling first and renamed into place, so a
    /// reader never observes a half-written playlist.
    pub async fn write_to(&self, output_root: &Path) -> Result<PathBuf> {
        let path = output_root.join(MASTER_PLAYLIST_NAME);
        let tmp = output_root.join(format!(".{}.tmp", MASTER_PLAYLIST_NAME));

        tokio::fs::write(&tmp, self.render())
            .await
            .map_err(|e| PackagerError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| PackagerError::io(&path, e))?;

        debug!(
            "Master playlist written: path={}, variants={}",
            path.display(),
            self.entries.len()
        );
        Ok(path)
    }
}

/// Render the master playlist text for a job set
pub fn render_master_playlist(jobs: &[RenditionJob]) -> Result<String> {
    MasterPlaylist::from_jobs(jobs).map(|playlist| playlist.render())
}
