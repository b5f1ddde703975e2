//! Bounded thumbnail cache with LRU eviction and eviction-driven release
//!
//! **Why**: Decoded thumbnails are the feed's main memory cost. The cache is
//! capped at a fixed kilobyte budget; inserting past the budget evicts the
//! least-recently-used entries, and eviction is the one place allowed to
//! release a thumbnail's pixel buffer.
//!
//! **Used by**: ThumbnailService (get/put), ThumbnailLoader (row binds)
//!
//! # Release discipline
//!
//! A thumbnail is released iff it was *evicted* and not *replaced*:
//! - budget eviction (`pop_lru`) releases the evicted value;
//! - a `put` overwriting the same key releases the old value itself, on the
//!   put path, and only when the new value is a distinct allocation.
//!
//! Rows may still hold an `Arc` to a released thumbnail; display paths must
//! check [`Thumbnail::is_released`] before drawing (the `isRecycled` check).
//!
//! # Concurrency
//!
//! All mutation goes through one `Mutex`. `get` promotes under the same lock,
//! so concurrent workers cannot corrupt LRU order or double-release.

use image::RgbaImage;
use log::{debug, warn};
use lru::LruCache;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::budget::CacheBudget;

/// A decoded thumbnail with an explicitly releasable pixel buffer.
#[derive(Debug)]
pub struct Thumbnail {
    pixels: Mutex<Option<RgbaImage>>,
    released: AtomicBool,
    width: u32,
    height: u32,
    size_kb: u64,
}

impl Thumbnail {
    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let size_kb = image.as_raw().len() as u64 / 1024;
        Self {
            pixels: Mutex::new(Some(image)),
            released: AtomicBool::new(false),
            width,
            height,
            size_kb,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw decoded byte footprint scaled to the cache unit (kilobytes).
    pub fn size_kb(&self) -> u64 {
        self.size_kb
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Free the pixel buffer. Idempotent; later `release` calls are no-ops.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            *self.pixels.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
    }

    /// Run `f` against the pixels, or `None` once released.
    pub fn with_pixels<R>(&self, f: impl FnOnce(&RgbaImage) -> R) -> Option<R> {
        let guard = self.pixels.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(f)
    }
}

struct CacheInner {
    lru: LruCache<String, Arc<Thumbnail>>,
    used_kb: u64,
}

/// Key -> thumbnail store bounded by a kilobyte budget.
pub struct ThumbnailCache {
    inner: Mutex<CacheInner>,
    capacity_kb: u64,
}

impl ThumbnailCache {
    pub fn new(budget: &CacheBudget) -> Self {
        Self::with_capacity_kb(budget.capacity_kb())
    }

    pub fn with_capacity_kb(capacity_kb: u64) -> Self {
        Self {
            // Unbounded entry count; eviction is driven by the byte budget
            inner: Mutex::new(CacheInner {
                lru: LruCache::unbounded(),
                used_kb: 0,
            }),
            capacity_kb,
        }
    }

    /// Get a thumbnail, promoting it to most-recently-used on hit.
    pub fn get(&self, key: &str) -> Option<Arc<Thumbnail>> {
        let mut inner = self.lock();
        inner.lru.get(key).cloned()
    }

    /// Check residency without touching LRU order.
    pub fn contains(&self, key: &str) -> bool {
        let inner = self.lock();
        inner.lru.peek(key).is_some()
    }

    /// Insert a thumbnail, evicting oldest-first until the budget holds.
    pub fn put(&self, key: &str, value: Arc<Thumbnail>) {
        let size_kb = value.size_kb();
        let mut inner = self.lock();

        // Same-key overwrite: the put path owns this transition. Remove the
        // old entry without going through the eviction path and release it
        // only if the new value is a distinct allocation.
        if let Some(old) = inner.lru.pop(key) {
            inner.used_kb = inner.used_kb.saturating_sub(old.size_kb());
            if !Arc::ptr_eq(&old, &value) {
                old.release();
                debug!("Replaced thumbnail '{}' ({} KB)", key, old.size_kb());
            }
        }

        // A single entry larger than the whole budget can never be resident
        if size_kb > self.capacity_kb {
            warn!(
                "Thumbnail '{}' ({} KB) exceeds cache capacity ({} KB), not cached",
                key, size_kb, self.capacity_kb
            );
            value.release();
            return;
        }

        // Evict down to capacity before inserting (evicted && !replaced)
        while inner.used_kb + size_kb > self.capacity_kb {
            match inner.lru.pop_lru() {
                Some((evicted_key, evicted)) => {
                    inner.used_kb = inner.used_kb.saturating_sub(evicted.size_kb());
                    evicted.release();
                    debug!(
                        "Evicted thumbnail '{}' ({} KB, usage {} / {} KB)",
                        evicted_key,
                        evicted.size_kb(),
                        inner.used_kb,
                        self.capacity_kb
                    );
                }
                None => break,
            }
        }

        inner.used_kb += size_kb;
        inner.lru.put(key.to_string(), value);
    }

    pub fn len(&self) -> usize {
        self.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current usage and capacity in kilobytes.
    pub fn mem_kb(&self) -> (u64, u64) {
        (self.lock().used_kb, self.capacity_kb)
    }

    pub fn capacity_kb(&self) -> u64 {
        self.capacity_kb
    }

    /// Release and drop every entry.
    pub fn clear(&self) {
        let mut inner = self.lock();
        while let Some((_, entry)) = inner.lru.pop_lru() {
            entry.release();
        }
        inner.used_kb = 0;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
