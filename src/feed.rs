//! Feed data model: the append-only list of video clips shown as chat rows.
//!
//! **Why**: The scrolling feed alternates sender/receiver bubbles over a
//! directory of bundled clips. Enumeration order is the list order, and the
//! role assignment derives from it (even index = sender).
//!
//! **Used by**: Feed controller (demo binary), visibility detection, tests

use anyhow::Context;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::utils::media;

/// Which side of the conversation a clip belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Sender,
    Receiver,
}

/// Row layout for a role. Rendering picks the bubble side from this,
/// no per-row-type dispatch needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Sender bubble, aligned right
    OutgoingRight,
    /// Receiver bubble, aligned left
    IncomingLeft,
}

impl Role {
    /// Pure role -> layout mapping.
    pub fn layout(self) -> Layout {
        match self {
            Role::Sender => Layout::OutgoingRight,
            Role::Receiver => Layout::IncomingLeft,
        }
    }
}

/// One clip in the feed. Immutable once created; the player only ever
/// reads `asset_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoItem {
    /// Stable identifier inside the feed
    pub id: Uuid,
    /// Path of the bundled asset, relative to the asset root
    pub asset_path: String,
    pub role: Role,
}

impl VideoItem {
    pub fn new(asset_path: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset_path: asset_path.into(),
            role,
        }
    }
}

/// Enumerate the asset directory into a feed list.
///
/// Only entries with recognized video extensions are considered. Entries are
/// sorted by file name so the list order (and therefore the sender/receiver
/// alternation) is deterministic across platforms.
pub fn load_feed(dir: &Path) -> anyhow::Result<Vec<VideoItem>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to enumerate assets in {}", dir.display()))?;

    let mut paths: Vec<_> = entries
        .filter_map(|e| match e {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                warn!("Skipping unreadable directory entry: {}", err);
                None
            }
        })
        .filter(|p| p.is_file() && media::is_video(p))
        .collect();
    paths.sort();

    let items: Vec<VideoItem> = paths
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let role = if index % 2 == 0 {
                Role::Sender
            } else {
                Role::Receiver
            };
            VideoItem::new(path.to_string_lossy().to_string(), role)
        })
        .collect();

    info!("Feed loaded: {} clips from {}", items.len(), dir.display());
    Ok(items)
}
