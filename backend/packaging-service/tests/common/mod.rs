//! Shared fakes for packaging-service integration tests
#![allow(dead_code)]

pub mod fake_encoder;
pub mod memory_storage;

use packaging_service::services::publish::PublishSettings;
use s3_utils::S3Config;
use std::time::Duration;
use video_core::{RenditionLadder, RenditionProfile};

/// Two-rung ladder used by most scenarios
pub fn two_rung_ladder() -> RenditionLadder {
    RenditionLadder::new(vec![
        RenditionProfile::parse(
            "1080p", "1920x1080", "5000k", "192k", "high", "4.0", "5350k", "7500k",
        )
        .unwrap(),
        RenditionProfile::parse(
            "720p", "1280x720", "2500k", "128k", "main", "3.1", "2675k", "4000k",
        )
        .unwrap(),
    ])
    .unwrap()
}

pub fn bucket_location() -> S3Config {
    S3Config {
        bucket: Some("media-test".to_string()),
        region: "us-east-1".to_string(),
        ..Default::default()
    }
}

pub fn fast_publish_settings() -> PublishSettings {
    PublishSettings {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        concurrency: 4,
    }
}
