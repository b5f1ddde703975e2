//! clipfeed - Video feed playback core library
//!
//! Re-exports all modules for use by binary targets.

// Playback core (cache, decoder, player, targets, workers)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod feed;
pub mod utils;

// Re-export commonly used types from core
pub use core::budget::CacheBudget;
pub use core::decoder::{ClockDecoder, Decoder, DecoderFactory};
pub use core::events::{EventHub, PlayerEvent};
pub use core::loader::ThumbnailLoader;
pub use core::player::{PlayerManager, PlayerState};
pub use core::target::{PlaybackTarget, TargetId, TargetRegistry};
pub use core::thumb_cache::{Thumbnail, ThumbnailCache};
pub use core::thumbnails::ThumbnailService;
pub use core::visibility::VisibilityDetector;
pub use core::workers::Workers;

// Re-export feed types
pub use config::FeedConfig;
pub use feed::{Role, VideoItem};
