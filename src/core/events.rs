//! Player event hub: the diagnostics and notification channel.
//!
//! Architecture:
//! - Components subscribe with callbacks (immediate invocation)
//! - emit() invokes callbacks immediately AND queues for deferred processing
//! - poll() returns queued events for batch processing on the control loop
//!
//! Decoder failures surface here and nowhere else; no retry policy is
//! attached at this layer (that belongs to the feed controller).
//!
//! Callback order: FIFO (first-subscribed, first-called).

use log::warn;
use std::sync::{Arc, Mutex, RwLock};

use super::decoder::DecoderState;
use super::target::{SurfaceHandle, TargetId};

/// Maximum events in queue before the oldest half is evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Events the playback core publishes.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// A deferred surface attach is ready to complete
    SurfaceReady {
        target: TargetId,
        surface: SurfaceHandle,
    },
    /// The decoder rendered its first frame into the active target
    FirstFrameRendered { target: TargetId },
    /// Decoder state transition (diagnostics)
    DecoderState { state: DecoderState },
    /// Decoder-level playback failure (diagnostics only, no retry here)
    DecoderError { message: String },
}

type Callback = Arc<dyn Fn(&PlayerEvent) + Send + Sync>;

/// Pub/sub hub with a deferred queue.
///
/// Cloning shares the underlying subscriber list and queue, so any clone can
/// emit and the control loop polls the same stream.
#[derive(Clone)]
pub struct EventHub {
    subscribers: Arc<RwLock<Vec<Callback>>>,
    queue: Arc<Mutex<Vec<PlayerEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            queue: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe to all player events.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Emit: invoke callbacks immediately, then queue for poll().
    pub fn emit(&self, event: PlayerEvent) {
        for cb in self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
        {
            cb(&event);
        }

        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict = queue.len() / 2;
            warn!("Event queue full ({} events), evicting oldest {}", queue.len(), evict);
            queue.drain(0..evict);
        }
        queue.push(event);
    }

    /// Drain all queued events for batch processing on the control loop.
    pub fn poll(&self) -> Vec<PlayerEvent> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_invokes_subscriber_and_queues() {
        let hub = EventHub::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        hub.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        hub.emit(PlayerEvent::DecoderError {
            message: "codec failure".into(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(hub.poll().len(), 1);
        assert_eq!(hub.poll().len(), 0);
    }

    #[test]
    fn test_clones_share_the_queue() {
        let hub = EventHub::new();
        let emitter = hub.clone();
        emitter.emit(PlayerEvent::FirstFrameRendered {
            target: crate::core::target::TargetRegistry::new()
                .register(Arc::new(crate::core::target::FeedTile::new())),
        });
        assert_eq!(hub.queue_len(), 1);
    }

    #[test]
    fn test_queue_eviction_keeps_newest_half() {
        let hub = EventHub::new();
        for i in 0..MAX_QUEUE_SIZE + 1 {
            hub.emit(PlayerEvent::DecoderError {
                message: format!("{}", i),
            });
        }
        assert!(hub.queue_len() <= MAX_QUEUE_SIZE / 2 + 2);
    }
}
