//! Playback targets: the renderable surface a row or fullscreen view exposes.
//!
//! **Why**: Rows are recycled and views die independently of playback, so the
//! player never holds a direct reference to a view. Targets are registered
//! under stable integer ids and every operation re-validates the id against
//! the registry; a dead id is a benign no-op.
//!
//! **Used by**: PlayerManager (attach/detach), ThumbnailLoader (liveness),
//! visibility detection

use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Opaque handle to a windowing-layer surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// Stable identifier of a registered target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u64);

impl TargetId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Surface-ready notification. Single-slot: registering a new callback
/// replaces (not queues) the previous one.
pub type SurfaceCallback = Box<dyn FnOnce(SurfaceHandle) + Send>;

/// Capability surface the player consumes from a row or fullscreen view.
///
/// Targets are passive: they expose a surface and placeholder visibility
/// toggles but never call decoder operations themselves.
pub trait PlaybackTarget: Send + Sync {
    fn is_surface_available(&self) -> bool;
    fn current_surface(&self) -> Option<SurfaceHandle>;
    /// Register the single-slot surface-ready callback, replacing any prior
    /// registration.
    fn on_surface_available(&self, callback: SurfaceCallback);
    fn show_placeholder(&self);
    fn hide_placeholder(&self);
    fn show_surface(&self);
    fn hide_surface(&self);
}

/// Registry mapping stable ids to live targets.
pub struct TargetRegistry {
    targets: Mutex<HashMap<u64, Arc<dyn PlaybackTarget>>>,
    next_id: AtomicU64,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self {
            targets: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a target and hand out its stable id.
    pub fn register(&self, target: Arc<dyn PlaybackTarget>) -> TargetId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, target);
        debug!("Target {} registered", id);
        TargetId(id)
    }

    /// Drop a target. Later lookups for this id return `None`.
    pub fn unregister(&self, id: TargetId) {
        if self.lock().remove(&id.0).is_some() {
            debug!("Target {} unregistered", id.0);
        }
    }

    pub fn get(&self, id: TargetId) -> Option<Arc<dyn PlaybackTarget>> {
        self.lock().get(&id.0).cloned()
    }

    pub fn is_live(&self, id: TargetId) -> bool {
        self.lock().contains_key(&id.0)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<dyn PlaybackTarget>>> {
        self.targets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Concrete target backing one feed row (or the fullscreen view).
///
/// The windowing side drives `surface_created` / `surface_destroyed`; the
/// player side drives visibility and the surface-ready callback slot.
pub struct FeedTile {
    surface: Mutex<Option<SurfaceHandle>>,
    on_ready: Mutex<Option<SurfaceCallback>>,
    placeholder_visible: AtomicBool,
    surface_visible: AtomicBool,
}

impl FeedTile {
    pub fn new() -> Self {
        Self {
            surface: Mutex::new(None),
            on_ready: Mutex::new(None),
            // Rows start on their placeholder image
            placeholder_visible: AtomicBool::new(true),
            surface_visible: AtomicBool::new(false),
        }
    }

    /// Windowing layer finished constructing the surface. Fires the pending
    /// surface-ready callback, if one is registered.
    pub fn surface_created(&self, handle: SurfaceHandle) {
        *self.surface.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        let callback = self
            .on_ready
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(cb) = callback {
            cb(handle);
        }
    }

    /// Windowing layer discarded the surface.
    pub fn surface_destroyed(&self) {
        *self.surface.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn placeholder_visible(&self) -> bool {
        self.placeholder_visible.load(Ordering::Acquire)
    }

    pub fn surface_visible(&self) -> bool {
        self.surface_visible.load(Ordering::Acquire)
    }
}

impl Default for FeedTile {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackTarget for FeedTile {
    fn is_surface_available(&self) -> bool {
        self.current_surface().is_some()
    }

    fn current_surface(&self) -> Option<SurfaceHandle> {
        *self.surface.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn on_surface_available(&self, callback: SurfaceCallback) {
        *self.on_ready.lock().unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    fn show_placeholder(&self) {
        self.placeholder_visible.store(true, Ordering::Release);
    }

    fn hide_placeholder(&self) {
        self.placeholder_visible.store(false, Ordering::Release);
    }

    fn show_surface(&self) {
        self.surface_visible.store(true, Ordering::Release);
    }

    fn hide_surface(&self) {
        self.surface_visible.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_registry_lookup_and_liveness() {
        let registry = TargetRegistry::new();
        let id = registry.register(Arc::new(FeedTile::new()));

        assert!(registry.is_live(id));
        assert!(registry.get(id).is_some());

        registry.unregister(id);
        assert!(!registry.is_live(id));
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let registry = TargetRegistry::new();
        let a = registry.register(Arc::new(FeedTile::new()));
        registry.unregister(a);
        let b = registry.register(Arc::new(FeedTile::new()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_tile_starts_on_placeholder() {
        let tile = FeedTile::new();
        assert!(tile.placeholder_visible());
        assert!(!tile.surface_visible());
        assert!(!tile.is_surface_available());
    }

    #[test]
    fn test_surface_ready_callback_fires_once() {
        let tile = FeedTile::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        tile.on_surface_available(Box::new(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        }));

        tile.surface_created(SurfaceHandle(7));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(tile.current_surface(), Some(SurfaceHandle(7)));

        // Slot was consumed; a second creation does not re-fire
        tile.surface_destroyed();
        tile.surface_created(SurfaceHandle(8));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_registration_replaces_previous() {
        let tile = FeedTile::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        tile.on_surface_available(Box::new(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        let s = Arc::clone(&second);
        tile.on_surface_available(Box::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));

        tile.surface_created(SurfaceHandle(1));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
