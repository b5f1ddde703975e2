//! Feed configuration with JSON persistence.
//!
//! Deployment constants (thumbnail resolution, seek timestamp, poll interval)
//! live here rather than being scattered through the modules that use them.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime configuration for the feed core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Thumbnail output width in pixels
    pub thumb_width: u32,
    /// Thumbnail output height in pixels
    pub thumb_height: u32,
    /// Timestamp the thumbnail frame is taken from, in milliseconds
    pub thumb_seek_ms: u64,
    /// Playback position poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Denominator of the cache budget: capacity = process memory KB / divisor
    pub cache_divisor: u64,
    /// Worker thread override (None = derive from CPU count)
    pub workers: Option<usize>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            thumb_width: 280,
            thumb_height: 200,
            thumb_seek_ms: 1_000,
            poll_interval_ms: 500,
            cache_divisor: 8,
            workers: None,
        }
    }
}

impl FeedConfig {
    /// Load config from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&json).context("failed to parse config")
    }

    /// Save config as pretty JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write config {}", path.display()))
    }
}
