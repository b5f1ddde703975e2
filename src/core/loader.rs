//! Thumbnail loader: async decode with per-target cancellation.
//!
//! **Why**: Rows are recycled faster than thumbnails decode. Each target has
//! at most one in-flight request; rebinding the row cancels the previous one,
//! and a decode result is only delivered while its request is still current
//! and its target still registered. Stale results are dropped, never shown.
//!
//! **Used by**: feed controller (row bind/recycle), demo binary

use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::target::{TargetId, TargetRegistry};
use super::thumb_cache::Thumbnail;
use super::thumbnails::ThumbnailService;
use super::workers::Workers;

/// Cancellation flag for one in-flight decode. Checked on the worker before
/// the result is committed or delivered.
#[derive(Clone)]
struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// True when both tokens belong to the same request.
    fn same_request(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

type InflightMap = Arc<Mutex<HashMap<u64, CancelToken>>>;

pub struct ThumbnailLoader {
    service: Arc<ThumbnailService>,
    workers: Arc<Workers>,
    registry: Arc<TargetRegistry>,
    inflight: InflightMap,
}

impl ThumbnailLoader {
    pub fn new(
        service: Arc<ThumbnailService>,
        workers: Arc<Workers>,
        registry: Arc<TargetRegistry>,
    ) -> Self {
        Self {
            service,
            workers,
            registry,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Bind a row to an asset: deliver its thumbnail now if cached, otherwise
    /// decode on a worker and deliver when done.
    ///
    /// Replaces (and cancels) any decode still in flight for this target.
    pub fn bind<F>(&self, target: TargetId, asset_path: &str, deliver: F)
    where
        F: FnOnce(Arc<Thumbnail>) + Send + 'static,
    {
        self.cancel_inflight(target);

        if let Some(thumb) = self.service.cached(asset_path) {
            deliver(thumb);
            return;
        }

        let token = CancelToken::new();
        self.lock_inflight().insert(target.raw(), token.clone());

        let service = Arc::clone(&self.service);
        let registry = Arc::clone(&self.registry);
        let inflight = Arc::clone(&self.inflight);
        let path = asset_path.to_string();
        let epoch = self.workers.current_epoch();

        self.workers.execute_with_epoch(epoch, move || {
            let result = (|| {
                if token.is_cancelled() {
                    debug!("Thumbnail request for {} cancelled before decode", path);
                    return None;
                }

                let thumb = service.generate(std::path::Path::new(&path))?;

                // Commit only while the request is still current and the row live
                if token.is_cancelled() || !registry.is_live(target) {
                    debug!("Thumbnail for {} became stale, dropping", path);
                    return None;
                }
                Some(thumb)
            })();

            // Request finished either way: drop its tracking entry, unless a
            // newer request for this target already replaced it
            Self::finish_inflight(&inflight, target, &token);

            if let Some(thumb) = result {
                service.cache(&path, Arc::clone(&thumb));
                deliver(thumb);
            }
        });
    }

    /// Row went off screen for recycling: cancel its pending decode.
    pub fn recycle(&self, target: TargetId) {
        self.cancel_inflight(target);
    }

    pub fn inflight_len(&self) -> usize {
        self.lock_inflight().len()
    }

    fn cancel_inflight(&self, target: TargetId) {
        if let Some(token) = self.lock_inflight().remove(&target.raw()) {
            token.cancel();
        }
    }

    fn finish_inflight(inflight: &InflightMap, target: TargetId, token: &CancelToken) {
        let mut map = inflight.lock().unwrap_or_else(|e| e.into_inner());
        if map
            .get(&target.raw())
            .is_some_and(|t| t.same_request(token))
        {
            map.remove(&target.raw());
        }
    }

    fn lock_inflight(&self) -> std::sync::MutexGuard<'_, HashMap<u64, CancelToken>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;
    use crate::core::target::{FeedTile, PlaybackTarget};
    use crate::core::thumb_cache::ThumbnailCache;
    use crate::core::thumbnails::FrameExtractor;
    use image::RgbaImage;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    /// Extractor that waits on a gate, to pin down cancellation ordering.
    /// Fails the decode when `fail` is set.
    struct GatedExtractor {
        gate: Arc<AtomicBool>,
        fail: Arc<AtomicBool>,
    }

    impl FrameExtractor for GatedExtractor {
        fn frame_at(&self, _path: &std::path::Path, _at: Duration) -> anyhow::Result<RgbaImage> {
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            while !self.gate.load(Ordering::SeqCst) {
                anyhow::ensure!(std::time::Instant::now() < deadline, "gate timed out");
                std::thread::sleep(Duration::from_millis(1));
            }
            anyhow::ensure!(!self.fail.load(Ordering::SeqCst), "decode failed");
            Ok(RgbaImage::new(280, 200))
        }
    }

    struct Fixture {
        loader: ThumbnailLoader,
        registry: Arc<TargetRegistry>,
        gate: Arc<AtomicBool>,
        fail: Arc<AtomicBool>,
        delivered: Arc<Mutex<Vec<String>>>,
    }

    impl Fixture {
        fn deliver_sink(&self, label: &str) -> impl FnOnce(Arc<Thumbnail>) + Send + 'static {
            let sink = Arc::clone(&self.delivered);
            let label = label.to_string();
            move |_thumb| sink.lock().unwrap().push(label)
        }

        fn wait_deliveries(&self, expected: usize) {
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            while self.delivered.lock().unwrap().len() < expected {
                assert!(std::time::Instant::now() < deadline, "timed out");
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        fn wait_inflight_empty(&self) {
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            while self.loader.inflight_len() > 0 {
                assert!(std::time::Instant::now() < deadline, "timed out");
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    fn fixture() -> Fixture {
        let gate = Arc::new(AtomicBool::new(false));
        let fail = Arc::new(AtomicBool::new(false));
        let cache = Arc::new(ThumbnailCache::with_capacity_kb(100_000));
        let service = Arc::new(ThumbnailService::new(
            cache,
            Box::new(GatedExtractor {
                gate: Arc::clone(&gate),
                fail: Arc::clone(&fail),
            }),
            &FeedConfig::default(),
        ));
        let workers = Arc::new(Workers::new(2, Arc::new(AtomicU64::new(0))).unwrap());
        let registry = Arc::new(TargetRegistry::new());
        let loader = ThumbnailLoader::new(service, workers, Arc::clone(&registry));
        Fixture {
            loader,
            registry,
            gate,
            fail,
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[test]
    fn test_decode_and_deliver() {
        let fx = fixture();
        let target = fx.registry.register(Arc::new(FeedTile::new()));

        fx.gate.store(true, Ordering::SeqCst);
        fx.loader.bind(target, "videos/a.mp4", fx.deliver_sink("a"));
        fx.wait_deliveries(1);
        assert_eq!(*fx.delivered.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_cache_hit_is_synchronous() {
        let fx = fixture();
        let target = fx.registry.register(Arc::new(FeedTile::new()));

        fx.gate.store(true, Ordering::SeqCst);
        fx.loader.bind(target, "videos/a.mp4", fx.deliver_sink("first"));
        fx.wait_deliveries(1);

        // Second bind hits the cache; delivery happens before bind returns
        fx.loader.bind(target, "videos/a.mp4", fx.deliver_sink("cached"));
        assert_eq!(
            *fx.delivered.lock().unwrap(),
            vec!["first", "cached"]
        );
    }

    #[test]
    fn test_rebind_cancels_previous_request() {
        let fx = fixture();
        let target = fx.registry.register(Arc::new(FeedTile::new()));

        // First request blocks on the gate; the rebind cancels it
        fx.loader.bind(target, "videos/old.mp4", fx.deliver_sink("old"));
        fx.loader.bind(target, "videos/new.mp4", fx.deliver_sink("new"));
        fx.gate.store(true, Ordering::SeqCst);

        fx.wait_deliveries(1);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(*fx.delivered.lock().unwrap(), vec!["new"]);

        // Both requests are done: cancelled and completed entries are gone
        fx.wait_inflight_empty();
    }

    #[test]
    fn test_completed_request_leaves_no_inflight_entry() {
        let fx = fixture();
        let target = fx.registry.register(Arc::new(FeedTile::new()));

        fx.gate.store(true, Ordering::SeqCst);
        fx.loader.bind(target, "videos/a.mp4", fx.deliver_sink("a"));
        fx.wait_deliveries(1);

        // Delivery happens after the tracking entry is dropped
        assert_eq!(fx.loader.inflight_len(), 0);
    }

    #[test]
    fn test_failed_decode_clears_inflight() {
        let fx = fixture();
        let target = fx.registry.register(Arc::new(FeedTile::new()));

        fx.fail.store(true, Ordering::SeqCst);
        fx.gate.store(true, Ordering::SeqCst);
        fx.loader.bind(target, "videos/broken.mp4", fx.deliver_sink("broken"));

        fx.wait_inflight_empty();
        assert!(fx.delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_recycled_target_gets_nothing() {
        let fx = fixture();
        let tile: Arc<dyn PlaybackTarget> = Arc::new(FeedTile::new());
        let target = fx.registry.register(tile);

        fx.loader.bind(target, "videos/a.mp4", fx.deliver_sink("a"));
        fx.registry.unregister(target);
        fx.gate.store(true, Ordering::SeqCst);

        std::thread::sleep(Duration::from_millis(50));
        assert!(fx.delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_recycle_cancels_inflight() {
        let fx = fixture();
        let target = fx.registry.register(Arc::new(FeedTile::new()));

        fx.loader.bind(target, "videos/a.mp4", fx.deliver_sink("a"));
        assert_eq!(fx.loader.inflight_len(), 1);
        fx.loader.recycle(target);
        assert_eq!(fx.loader.inflight_len(), 0);

        fx.gate.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        assert!(fx.delivered.lock().unwrap().is_empty());
    }
}
