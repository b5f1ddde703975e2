//! Playback core - cache, decoder, player, targets, workers
//!
//! These modules form the playback engine, independent of any UI layer.

pub mod budget;
pub mod decoder;
pub mod events;
pub mod loader;
pub mod player;
pub mod target;
pub mod thumb_cache;
pub mod thumbnails;
pub mod visibility;
pub mod workers;

// Re-exports for convenience
pub use budget::CacheBudget;
pub use decoder::{ClockDecoder, Decoder, DecoderFactory};
pub use events::{EventHub, PlayerEvent};
pub use loader::ThumbnailLoader;
pub use player::{PlayerManager, PlayerState};
pub use target::{FeedTile, PlaybackTarget, SurfaceHandle, TargetId, TargetRegistry};
pub use thumb_cache::{Thumbnail, ThumbnailCache};
pub use thumbnails::{FrameExtractor, StillExtractor, ThumbnailService};
pub use visibility::{RowView, Viewport, VisibilityDetector};
pub use workers::Workers;
