//! PlayerManager: one shared decoder rebound across recycled row targets.
//!
//! **Why**: The feed auto-plays exactly one clip. The manager owns the single
//! decoder instance, moves its surface binding to whichever target is active,
//! survives targets whose surfaces are not constructed yet, and hands the
//! binding off to a fullscreen view and back without restarting playback.
//!
//! **Used by**: VisibilityDetector (scroll-idle), feed controller
//!
//! # Threading
//!
//! All operations run on the single control context and are processed in
//! arrival order. Nothing here blocks: decoder preparation and surface
//! readiness report back through the event hub, drained by [`PlayerManager::pump`]
//! on the same context.

use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::decoder::{Decoder, DecoderEvent, DecoderFactory};
use super::events::{EventHub, PlayerEvent};
use super::target::{TargetId, TargetRegistry};

/// Conceptual player states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No active item, decoder unprepared
    Idle,
    /// Media source set, first frame not yet rendered
    Preparing,
    Playing,
    Paused,
    /// A row's playback moved to a fullscreen presentation
    FullscreenDetached,
    /// Decoder torn down; the next play call recreates it
    Released,
}

/// A deferred surface attach. Registering a newer attach cancels this one,
/// so a late surface-ready callback can never stomp the newer binding.
struct AttachTicket {
    target: TargetId,
    cancelled: Arc<AtomicBool>,
}

impl AttachTicket {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Checked out on `attach_to_fullscreen`, checked back in on
/// `detach_from_fullscreen`. Remembers the origin row across the episode.
struct FullscreenToken {
    origin: TargetId,
}

pub struct PlayerManager {
    decoder: Option<Box<dyn Decoder>>,
    factory: DecoderFactory,
    registry: Arc<TargetRegistry>,
    events: EventHub,
    state: PlayerState,
    active_index: Option<usize>,
    active_target: Option<TargetId>,
    pending_attach: Option<AttachTicket>,
    fullscreen: Option<FullscreenToken>,
    last_error: Option<String>,
}

impl PlayerManager {
    /// The decoder is an explicitly owned resource: the feed controller hands
    /// in the factory, nothing is ambient.
    pub fn new(factory: DecoderFactory, registry: Arc<TargetRegistry>, events: EventHub) -> Self {
        Self {
            decoder: None,
            factory,
            registry,
            events,
            state: PlayerState::Idle,
            active_index: None,
            active_target: None,
            pending_attach: None,
            fullscreen: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    pub fn active_target(&self) -> Option<TargetId> {
        self.active_target
    }

    pub fn position_ms(&self) -> u64 {
        self.decoder.as_ref().map(|d| d.position_ms()).unwrap_or(0)
    }

    pub fn is_playing(&self) -> bool {
        self.decoder.as_ref().map(|d| d.is_playing()).unwrap_or(false)
    }

    /// Last decoder error message, if any (diagnostics only).
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn events(&self) -> EventHub {
        self.events.clone()
    }

    /// Play `asset_path` into `target`.
    ///
    /// Repeated calls for the already-active (index, target) pair are no-ops,
    /// so visibility re-triggers on the same row never restart playback.
    pub fn prepare_and_play(&mut self, index: usize, asset_path: &str, target: TargetId) {
        if self.active_index == Some(index) && self.active_target == Some(target) {
            debug!("Already playing row {}, ignoring", index);
            return;
        }

        self.ensure_decoder();
        self.cancel_pending_attach();
        self.fullscreen = None;

        // Full stop before rebinding; safe when nothing was set
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.stop();
            decoder.clear_source();
            decoder.set_surface(None);
        }

        // Previous row falls back to its placeholder
        if let Some(old) = self.active_target
            && let Some(tile) = self.registry.get(old)
        {
            tile.hide_surface();
            tile.show_placeholder();
        }

        // A recycled target is benign: nothing to attach to
        let Some(tile) = self.registry.get(target) else {
            warn!("Row {} target is gone, skipping playback", index);
            self.active_index = None;
            self.active_target = None;
            self.state = PlayerState::Idle;
            return;
        };

        tile.show_surface();
        tile.hide_placeholder();

        self.active_index = Some(index);
        self.active_target = Some(target);

        let decoder = self
            .decoder
            .as_mut()
            .expect("decoder exists after ensure_decoder");
        decoder.set_source(Path::new(asset_path));
        decoder.set_listener(Some(Self::decoder_listener(
            self.events.clone(),
            Arc::clone(&self.registry),
            target,
        )));
        decoder.prepare();
        decoder.set_play_when_ready(true);
        self.state = PlayerState::Preparing;

        self.attach_surface(target);
        info!("Preparing row {} ({})", index, asset_path);
    }

    /// Pause without clearing the media source or surface binding. Idempotent.
    pub fn pause(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.pause();
        }
        if matches!(self.state, PlayerState::Playing | PlayerState::Preparing) {
            self.state = PlayerState::Paused;
        }
    }

    /// Soft release: clear source, surface and active references but keep the
    /// decoder instance alive for reuse (feed hidden but may return).
    pub fn release(&mut self) {
        self.cancel_pending_attach();
        self.fullscreen = None;

        if let Some(decoder) = self.decoder.as_mut() {
            decoder.pause();
            decoder.stop();
            decoder.clear_source();
            decoder.set_surface(None);
            decoder.set_listener(None);
        }

        if let Some(old) = self.active_target.take()
            && let Some(tile) = self.registry.get(old)
        {
            tile.hide_surface();
            tile.show_placeholder();
        }
        self.active_index = None;

        if self.state != PlayerState::Released {
            self.state = PlayerState::Idle;
        }
        debug!("Player released (decoder kept)");
    }

    /// Tear the decoder down entirely. The next `prepare_and_play` recreates
    /// it through the factory (feed permanently destroyed).
    pub fn release_completely(&mut self) {
        self.release();
        self.decoder = None;
        self.state = PlayerState::Released;
        info!("Player released completely");
    }

    /// Hand the surface binding off to a fullscreen target, preserving
    /// position and play/pause state so the video does not visibly restart.
    pub fn attach_to_fullscreen(&mut self, target: TargetId) {
        if self.fullscreen.is_some() {
            warn!("Fullscreen token already checked out, ignoring");
            return;
        }
        let Some(origin) = self.active_target else {
            warn!("No active playback to take fullscreen");
            return;
        };
        let Some(tile) = self.registry.get(target) else {
            warn!("Fullscreen target is gone, staying in feed");
            return;
        };
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };

        let position_ms = decoder.position_ms();
        let was_playing = decoder.is_playing();

        // Detach without logically stopping playback
        decoder.set_surface(None);
        self.cancel_pending_attach();

        if let Some(row) = self.registry.get(origin) {
            row.hide_surface();
            row.show_placeholder();
        }
        tile.show_surface();
        tile.hide_placeholder();

        let decoder = self.decoder.as_mut().expect("decoder checked above");
        decoder.seek_ms(position_ms);
        decoder.set_play_when_ready(was_playing);

        self.fullscreen = Some(FullscreenToken { origin });
        self.active_target = Some(target);
        self.state = PlayerState::FullscreenDetached;
        self.attach_surface(target);
        debug!(
            "Fullscreen hand-off at {} ms (playing: {})",
            position_ms, was_playing
        );
    }

    /// Return the surface binding to the row that held it before the
    /// fullscreen episode.
    pub fn detach_from_fullscreen(&mut self) {
        let Some(token) = self.fullscreen.take() else {
            warn!("No fullscreen token checked out, ignoring");
            return;
        };
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };

        let position_ms = decoder.position_ms();
        let playing = decoder.is_playing();

        decoder.set_surface(None);
        self.cancel_pending_attach();

        if let Some(fs) = self.active_target
            && let Some(tile) = self.registry.get(fs)
        {
            tile.hide_surface();
            tile.show_placeholder();
        }

        self.state = if playing {
            PlayerState::Playing
        } else {
            PlayerState::Paused
        };

        let Some(row) = self.registry.get(token.origin) else {
            // Origin row was recycled while fullscreen; keep playing headless
            warn!("Origin row gone after fullscreen, surface unbound");
            self.active_target = None;
            return;
        };
        row.show_surface();
        row.hide_placeholder();

        let decoder = self.decoder.as_mut().expect("decoder checked above");
        decoder.seek_ms(position_ms);
        decoder.set_play_when_ready(playing);

        self.active_target = Some(token.origin);
        self.attach_surface(token.origin);
        debug!(
            "Fullscreen hand-back at {} ms (playing: {})",
            position_ms, playing
        );
    }

    /// Drain and apply queued events on the control context.
    pub fn pump(&mut self) {
        loop {
            let events = self.events.poll();
            if events.is_empty() {
                break;
            }
            for event in events {
                self.apply(event);
            }
        }
    }

    fn apply(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::SurfaceReady { target, surface } => {
                let matches_pending = self
                    .pending_attach
                    .as_ref()
                    .is_some_and(|t| t.target == target && !t.cancelled.load(Ordering::Acquire));
                if matches_pending && self.active_target == Some(target) {
                    self.pending_attach = None;
                    if let Some(decoder) = self.decoder.as_mut() {
                        decoder.set_surface(Some(surface));
                        debug!("Deferred surface attach completed for {:?}", target);
                    }
                }
            }
            PlayerEvent::FirstFrameRendered { .. } => {
                if self.state == PlayerState::Preparing {
                    self.state = PlayerState::Playing;
                }
            }
            PlayerEvent::DecoderState { state } => {
                debug!("Decoder state: {:?}", state);
            }
            PlayerEvent::DecoderError { message } => {
                // Diagnostics only; the decoder keeps accepting new sources
                log::error!("Decoder error: {}", message);
                self.last_error = Some(message);
            }
        }
    }

    /// Listener bridging decoder events onto the hub. Hides the target's
    /// placeholder exactly once, on the first rendered frame.
    fn decoder_listener(
        events: EventHub,
        registry: Arc<TargetRegistry>,
        target: TargetId,
    ) -> super::decoder::DecoderListener {
        let fired = AtomicBool::new(false);
        Arc::new(move |event| match event {
            DecoderEvent::FirstFrameRendered => {
                if !fired.swap(true, Ordering::AcqRel) {
                    if let Some(tile) = registry.get(target) {
                        tile.hide_placeholder();
                    }
                    events.emit(PlayerEvent::FirstFrameRendered { target });
                }
            }
            DecoderEvent::StateChanged(state) => {
                events.emit(PlayerEvent::DecoderState { state });
            }
            DecoderEvent::Error(message) => {
                events.emit(PlayerEvent::DecoderError { message });
            }
        })
    }

    /// Attach the target's surface now if it exists, otherwise leave a
    /// cancellable ticket for the surface-ready notification.
    fn attach_surface(&mut self, target: TargetId) {
        let Some(tile) = self.registry.get(target) else {
            return;
        };

        if let Some(handle) = tile.current_surface() {
            if let Some(decoder) = self.decoder.as_mut() {
                decoder.set_surface(Some(handle));
            }
            return;
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let ticket = AttachTicket {
            target,
            cancelled: Arc::clone(&cancelled),
        };
        let events = self.events.clone();
        tile.on_surface_available(Box::new(move |handle| {
            if !cancelled.load(Ordering::Acquire) {
                events.emit(PlayerEvent::SurfaceReady {
                    target,
                    surface: handle,
                });
            }
        }));
        self.pending_attach = Some(ticket);
        debug!("Surface not ready for {:?}, attach deferred", target);
    }

    fn cancel_pending_attach(&mut self) {
        if let Some(ticket) = self.pending_attach.take() {
            ticket.cancel();
        }
    }

    fn ensure_decoder(&mut self) {
        if self.decoder.is_none() {
            self.decoder = Some((self.factory)());
            if self.state == PlayerState::Released {
                self.state = PlayerState::Idle;
            }
            debug!("Decoder instance created");
        }
    }
}
