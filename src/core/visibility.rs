//! Visibility detection: which row auto-plays when scrolling settles.
//!
//! **Why**: The feed plays the bottom-most fully visible clip. Scrolling
//! naturally proceeds downward, so the scan walks rows from last to first and
//! picks the first qualifying one. A row qualifies only when it fits entirely
//! inside the viewport; clicks are more lenient and accept any intersection.
//!
//! **Used by**: feed controller (scroll-idle and click handlers), demo binary

use log::debug;

use super::player::PlayerManager;
use super::target::TargetId;
use crate::feed::VideoItem;

/// Vertical extent of the visible feed area, in layout units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub top: i64,
    pub bottom: i64,
}

impl Viewport {
    pub fn new(top: i64, bottom: i64) -> Self {
        Self { top, bottom }
    }
}

/// Laid-out position of one feed row, paired with its playback target.
#[derive(Debug, Clone, Copy)]
pub struct RowView {
    pub index: usize,
    pub top: i64,
    pub bottom: i64,
    pub target: TargetId,
}

impl RowView {
    fn fully_inside(&self, viewport: Viewport) -> bool {
        self.top >= viewport.top && self.bottom <= viewport.bottom
    }

    fn intersects(&self, viewport: Viewport) -> bool {
        self.top < viewport.bottom && self.bottom > viewport.top
    }
}

pub struct VisibilityDetector;

impl VisibilityDetector {
    pub fn new() -> Self {
        Self
    }

    /// The bottom-most row that fits entirely inside the viewport.
    pub fn select(&self, rows: &[RowView], viewport: Viewport) -> Option<RowView> {
        rows.iter().rev().find(|r| r.fully_inside(viewport)).copied()
    }

    /// Scroll settled: auto-play the selected row, or pause when none
    /// qualifies (fast fling past all rows, or all rows clipped).
    pub fn on_scroll_idle(
        &self,
        rows: &[RowView],
        viewport: Viewport,
        feed: &[VideoItem],
        player: &mut PlayerManager,
    ) {
        match self.select(rows, viewport) {
            Some(row) => {
                let Some(item) = feed.get(row.index) else {
                    debug!("Row {} has no feed item, skipping", row.index);
                    return;
                };
                player.prepare_and_play(row.index, &item.asset_path, row.target);
            }
            None => {
                debug!("No fully visible row, pausing");
                player.pause();
            }
        }
    }

    /// Explicit tap on a row: play it if any part of it is on screen.
    pub fn on_item_click(
        &self,
        row: RowView,
        viewport: Viewport,
        feed: &[VideoItem],
        player: &mut PlayerManager,
    ) {
        if !row.intersects(viewport) {
            debug!("Clicked row {} is off screen, ignoring", row.index);
            return;
        }
        if let Some(item) = feed.get(row.index) {
            player.prepare_and_play(row.index, &item.asset_path, row.target);
        }
    }
}

impl Default for VisibilityDetector {
    fn default() -> Self {
        Self::new()
    }
}
