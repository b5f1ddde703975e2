//! Thumbnail generation: one decoded frame per asset, scaled and cached.
//!
//! **Why**: Every row shows a preview image before its clip plays. Generation
//! decodes a single frame near the 1 second mark, scales it to the configured
//! thumbnail resolution and hands it to the bounded cache. Failures degrade
//! to "no thumbnail" - they are logged and never propagated upward.
//!
//! **Used by**: ThumbnailLoader (worker tasks), demo binary
//!
//! All decode resources are scoped: the extractor returns an owned frame and
//! every exit path (including the error ones) drops it.

use image::RgbaImage;
use image::imageops::{self, FilterType};
use log::warn;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::thumb_cache::{Thumbnail, ThumbnailCache};
use crate::config::FeedConfig;

/// Decodes one frame of an asset near a timestamp.
///
/// Seek policy is "closest prior or at": implementations return the decoded
/// frame at the given timestamp or the nearest one before it.
pub trait FrameExtractor: Send + Sync {
    fn frame_at(&self, path: &Path, at: Duration) -> anyhow::Result<RgbaImage>;
}

/// Extractor for still-image assets: the only frame is the image itself,
/// so any seek timestamp resolves to it.
pub struct StillExtractor;

impl FrameExtractor for StillExtractor {
    fn frame_at(&self, path: &Path, _at: Duration) -> anyhow::Result<RgbaImage> {
        let image = image::open(path)?;
        Ok(image.to_rgba8())
    }
}

/// Seek policy: a decoded frame may replace the held one only while its
/// timestamp is at or before the target.
#[cfg(any(test, feature = "ffmpeg"))]
fn at_or_before(pts: i64, target_ts: i64) -> bool {
    pts <= target_ts
}

/// Extractor for video containers, decoding via FFmpeg.
#[cfg(feature = "ffmpeg")]
pub struct VideoExtractor;

#[cfg(feature = "ffmpeg")]
impl FrameExtractor for VideoExtractor {
    fn frame_at(&self, path: &Path, at: Duration) -> anyhow::Result<RgbaImage> {
        use anyhow::Context;
        use ffmpeg_next as ffmpeg;

        ffmpeg::init().context("ffmpeg init failed")?;
        let mut input = ffmpeg::format::input(path)?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .context("no video stream")?;
        let stream_index = stream.index();
        let time_base = stream.time_base();

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
        let mut decoder = context.decoder().video()?;

        // Seek to the closest keyframe at or before the target timestamp
        let target_ts =
            (at.as_millis() as i64 * time_base.denominator() as i64) / (time_base.numerator() as i64 * 1000);
        input.seek(target_ts, ..target_ts)?;

        let mut scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGBA,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )?;

        let mut last: Option<RgbaImage> = None;
        'packets: for (stream, packet) in input.packets() {
            if stream.index() != stream_index {
                continue;
            }
            decoder.send_packet(&packet)?;
            let mut decoded = ffmpeg::util::frame::video::Video::empty();
            while decoder.receive_frame(&mut decoded).is_ok() {
                // Past the target: the held frame is the closest prior one
                if !at_or_before(decoded.pts().unwrap_or(0), target_ts) {
                    break 'packets;
                }
                let mut rgba = ffmpeg::util::frame::video::Video::empty();
                scaler.run(&decoded, &mut rgba)?;
                last = Some(
                    RgbaImage::from_raw(decoder.width(), decoder.height(), rgba.data(0).to_vec())
                        .context("frame buffer size mismatch")?,
                );
            }
        }

        last.context("no decodable frame at or before the seek timestamp")
    }
}

/// Generates, caches and looks up thumbnails.
///
/// The rest of the system depends on this capability surface, never on the
/// cache implementation directly.
pub struct ThumbnailService {
    cache: Arc<ThumbnailCache>,
    extractor: Box<dyn FrameExtractor>,
    thumb_width: u32,
    thumb_height: u32,
    seek: Duration,
}

impl ThumbnailService {
    pub fn new(
        cache: Arc<ThumbnailCache>,
        extractor: Box<dyn FrameExtractor>,
        config: &FeedConfig,
    ) -> Self {
        Self {
            cache,
            extractor,
            thumb_width: config.thumb_width,
            thumb_height: config.thumb_height,
            seek: Duration::from_millis(config.thumb_seek_ms),
        }
    }

    /// Decode and scale a preview image for the asset.
    ///
    /// Blocking; must run on a worker context, never the control thread.
    /// Returns `None` on any decode failure (corrupt asset, I/O error).
    pub fn generate(&self, asset_path: &Path) -> Option<Arc<Thumbnail>> {
        let frame = match self.extractor.frame_at(asset_path, self.seek) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(
                    "Thumbnail generation failed for {}: {}",
                    asset_path.display(),
                    err
                );
                return None;
            }
        };

        // Skip the resize when the frame is already size-exact; otherwise the
        // pre-scale frame is a distinct allocation and drops right here.
        let scaled = if frame.dimensions() == (self.thumb_width, self.thumb_height) {
            frame
        } else {
            imageops::resize(
                &frame,
                self.thumb_width,
                self.thumb_height,
                FilterType::CatmullRom,
            )
        };

        Some(Arc::new(Thumbnail::from_image(scaled)))
    }

    /// Cache lookup; released entries read as misses.
    pub fn cached(&self, asset_path: &str) -> Option<Arc<Thumbnail>> {
        self.cache.get(asset_path).filter(|t| !t.is_released())
    }

    pub fn cache(&self, asset_path: &str, thumbnail: Arc<Thumbnail>) {
        self.cache.put(asset_path, thumbnail);
    }
}
