//! Rendition ladder core models and types
//!
//! Shared data structures for the HLS packaging pipeline

pub mod constants;
pub mod models;

pub use models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_job_state_str() {
        assert_eq!(JobState::Pending.as_str(), "pending");
        assert_eq!(JobState::Running.as_str(), "running");
        assert_eq!(JobState::Succeeded.as_str(), "succeeded");
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn test_ladder_json_file_roundtrip() {
        let ladder = RenditionLadder::default_ladder();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&ladder).unwrap().as_bytes())
            .unwrap();

        let loaded = RenditionLadder::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, ladder);
    }
}
