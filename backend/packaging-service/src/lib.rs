//! Packaging Service
//!
//! Turns one source video into an adaptive-bitrate HLS package: a ladder of
//! H.264/AAC renditions, a master playlist, and a published object tree.

pub mod config;
pub mod error;
pub mod logging;
pub mod services;

// Public re-exports
pub use config::Config;
pub use error::{PackagerError, Result};
