use clipfeed::cli::Args;
use clipfeed::config::FeedConfig;
use clipfeed::core::budget::CacheBudget;
use clipfeed::core::decoder::{ClockDecoder, DecoderFactory};
use clipfeed::core::events::EventHub;
use clipfeed::core::loader::ThumbnailLoader;
use clipfeed::core::player::PlayerManager;
use clipfeed::core::target::{FeedTile, PlaybackTarget, SurfaceHandle, TargetRegistry};
use clipfeed::core::thumb_cache::ThumbnailCache;
use clipfeed::core::thumbnails::{FrameExtractor, ThumbnailService};
use clipfeed::core::visibility::{RowView, Viewport, VisibilityDetector};
use clipfeed::core::workers::Workers;
use clipfeed::feed;

use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Layout height of one feed row in the simulated list.
const ROW_HEIGHT: i64 = 100;
/// Rows visible at once in the simulated viewport.
const VIEWPORT_ROWS: i64 = 4;

fn extractor() -> Box<dyn FrameExtractor> {
    #[cfg(feature = "ffmpeg")]
    {
        Box::new(clipfeed::core::thumbnails::VideoExtractor)
    }
    #[cfg(not(feature = "ffmpeg"))]
    {
        Box::new(clipfeed::core::thumbnails::StillExtractor)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = match args.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    info!("clipfeed starting...");
    debug!("Command-line args: {:?}", args);

    let config = match &args.config {
        Some(path) => FeedConfig::load(path)?,
        None => FeedConfig::default(),
    };

    let items = feed::load_feed(&args.feed_dir)?;
    if items.is_empty() {
        warn!("No video assets in {}", args.feed_dir.display());
        return Ok(());
    }
    info!("Feed loaded: {} items", items.len());

    // Shared services, wired explicitly
    let budget = CacheBudget::new(config.cache_divisor);
    let cache = Arc::new(ThumbnailCache::new(&budget));
    let service = Arc::new(ThumbnailService::new(
        Arc::clone(&cache),
        extractor(),
        &config,
    ));
    let num_workers = args
        .workers
        .or(config.workers)
        .unwrap_or_else(|| num_cpus::get().saturating_sub(1).max(1));
    let workers = Arc::new(Workers::new(num_workers, budget.epoch_ref())?);
    let registry = Arc::new(TargetRegistry::new());
    let loader = ThumbnailLoader::new(service, Arc::clone(&workers), Arc::clone(&registry));

    let factory: DecoderFactory = Box::new(|| Box::new(ClockDecoder::new()));
    let mut player = PlayerManager::new(factory, Arc::clone(&registry), EventHub::new());
    let detector = VisibilityDetector::new();

    // One tile per row, surfaces already constructed
    let rows: Vec<RowView> = items
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let tile = Arc::new(FeedTile::new());
            let target = registry.register(Arc::clone(&tile) as Arc<dyn PlaybackTarget>);
            tile.surface_created(SurfaceHandle(target.raw()));
            RowView {
                index: i,
                top: i as i64 * ROW_HEIGHT,
                bottom: (i as i64 + 1) * ROW_HEIGHT,
                target,
            }
        })
        .collect();

    for row in &rows {
        let item = &items[row.index];
        let path = item.asset_path.clone();
        loader.bind(row.target, &item.asset_path, move |thumb| {
            debug!("Thumbnail ready for {} ({} KB)", path, thumb.size_kb());
        });
    }

    // Scroll the viewport down the feed; every stop settles on a row
    let total_height = rows.len() as i64 * ROW_HEIGHT;
    let viewport_height = VIEWPORT_ROWS * ROW_HEIGHT;
    for pass in 0..args.passes {
        info!("Scroll pass {}", pass + 1);
        let mut top = 0;
        while top + viewport_height <= total_height {
            let viewport = Viewport::new(top, top + viewport_height);
            detector.on_scroll_idle(&rows, viewport, &items, &mut player);
            player.pump();
            debug!(
                "Viewport {}..{} -> row {:?} ({:?})",
                viewport.top,
                viewport.bottom,
                player.active_index(),
                player.state()
            );
            std::thread::sleep(Duration::from_millis(config.poll_interval_ms));
            player.pump();
            top += ROW_HEIGHT;
        }
    }

    // Fullscreen hand-off on whatever row playback settled on
    let fs_tile = Arc::new(FeedTile::new());
    let fs_target = registry.register(Arc::clone(&fs_tile) as Arc<dyn PlaybackTarget>);
    fs_tile.surface_created(SurfaceHandle(fs_target.raw()));

    let before = player.position_ms();
    player.attach_to_fullscreen(fs_target);
    player.pump();
    std::thread::sleep(Duration::from_millis(config.poll_interval_ms));
    player.detach_from_fullscreen();
    player.pump();
    info!(
        "Fullscreen round trip: {} ms -> {} ms (state {:?})",
        before,
        player.position_ms(),
        player.state()
    );

    player.release_completely();
    info!("clipfeed done");
    Ok(())
}
