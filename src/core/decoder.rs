//! Decoder seam: the single shared playback engine behind the feed.
//!
//! **Why**: Exactly one decoder/renderer instance exists for the whole feed.
//! The player manager owns it through this trait, the feed controller decides
//! which backend to construct (via [`DecoderFactory`]), and nothing touches
//! it ambiently.
//!
//! **Used by**: PlayerManager (all playback operations), demo binary, tests
//!
//! Preparation is asynchronous from the caller's point of view: completion
//! and failures are reported through the listener, never by blocking.

use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use super::target::SurfaceHandle;

/// Decoder lifecycle states, reported through [`DecoderEvent::StateChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// No media source set, or stopped
    Unprepared,
    /// Media source set, preparation in flight
    Preparing,
    /// Prepared; plays as soon as a surface and play-when-ready line up
    Ready,
}

/// Notifications the decoder pushes to its single listener.
#[derive(Debug, Clone)]
pub enum DecoderEvent {
    /// First frame of the current source hit the surface
    FirstFrameRendered,
    StateChanged(DecoderState),
    /// Playback failure; the decoder stays usable for the next source
    Error(String),
}

pub type DecoderListener = Arc<dyn Fn(DecoderEvent) + Send + Sync>;

/// The playback engine contract the manager drives.
pub trait Decoder: Send {
    fn set_source(&mut self, path: &Path);
    fn clear_source(&mut self);
    /// Begin asynchronous preparation of the current source.
    fn prepare(&mut self);
    fn set_surface(&mut self, surface: Option<SurfaceHandle>);
    fn set_play_when_ready(&mut self, play: bool);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek_ms(&mut self, position_ms: u64);
    fn position_ms(&self) -> u64;
    fn is_playing(&self) -> bool;
    /// Install or clear the event listener (single slot).
    fn set_listener(&mut self, listener: Option<DecoderListener>);
}

/// Constructor for decoder instances, owned by the feed controller.
///
/// `release_completely` tears the instance down; the next play call
/// recreates one through this factory.
pub type DecoderFactory = Box<dyn Fn() -> Box<dyn Decoder> + Send>;

/// Wall-clock playback engine.
///
/// Tracks position with `Instant` arithmetic instead of decoding media, which
/// gives the manager real pause/seek/continuity semantics without a codec
/// backend. The demo binary and the tests run on it.
pub struct ClockDecoder {
    source: Option<PathBuf>,
    surface: Option<SurfaceHandle>,
    state: DecoderState,
    play_when_ready: bool,
    /// Frozen position; live position adds the running clock on top
    base_ms: u64,
    started_at: Option<Instant>,
    first_frame_sent: bool,
    listener: Option<DecoderListener>,
}

impl ClockDecoder {
    pub fn new() -> Self {
        Self {
            source: None,
            surface: None,
            state: DecoderState::Unprepared,
            play_when_ready: false,
            base_ms: 0,
            started_at: None,
            first_frame_sent: false,
            listener: None,
        }
    }

    fn emit(&self, event: DecoderEvent) {
        if let Some(listener) = &self.listener {
            listener(event);
        }
    }

    fn set_state(&mut self, state: DecoderState) {
        if self.state != state {
            self.state = state;
            self.emit(DecoderEvent::StateChanged(state));
        }
    }

    /// Freeze the clock into `base_ms`.
    fn freeze(&mut self) {
        self.base_ms = self.position_ms();
        self.started_at = None;
    }

    /// Start the clock when prepared source, surface and play intent line up.
    fn maybe_start(&mut self) {
        if self.state == DecoderState::Ready
            && self.play_when_ready
            && self.surface.is_some()
            && self.started_at.is_none()
        {
            self.started_at = Some(Instant::now());
            if !self.first_frame_sent {
                self.first_frame_sent = true;
                self.emit(DecoderEvent::FirstFrameRendered);
            }
        }
    }
}

impl Default for ClockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ClockDecoder {
    fn set_source(&mut self, path: &Path) {
        debug!("Decoder source: {}", path.display());
        self.source = Some(path.to_path_buf());
        self.base_ms = 0;
        self.started_at = None;
        self.first_frame_sent = false;
        self.set_state(DecoderState::Unprepared);
    }

    fn clear_source(&mut self) {
        self.source = None;
        self.base_ms = 0;
        self.started_at = None;
        self.first_frame_sent = false;
        self.set_state(DecoderState::Unprepared);
    }

    fn prepare(&mut self) {
        if self.source.is_none() {
            self.emit(DecoderEvent::Error("prepare without a media source".into()));
            return;
        }
        self.set_state(DecoderState::Preparing);
        // The clock engine has nothing to buffer; it is ready immediately
        self.set_state(DecoderState::Ready);
        self.maybe_start();
    }

    fn set_surface(&mut self, surface: Option<SurfaceHandle>) {
        self.surface = surface;
        // Losing the surface does not stop the logical playback clock
        self.maybe_start();
    }

    fn set_play_when_ready(&mut self, play: bool) {
        self.play_when_ready = play;
        if play {
            self.maybe_start();
        } else {
            self.freeze();
        }
    }

    fn pause(&mut self) {
        self.set_play_when_ready(false);
    }

    fn stop(&mut self) {
        self.freeze();
        self.base_ms = 0;
        self.play_when_ready = false;
        self.set_state(DecoderState::Unprepared);
    }

    fn seek_ms(&mut self, position_ms: u64) {
        let was_running = self.started_at.is_some();
        self.base_ms = position_ms;
        self.started_at = if was_running {
            Some(Instant::now())
        } else {
            None
        };
    }

    fn position_ms(&self) -> u64 {
        let running = self
            .started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.base_ms + running
    }

    fn is_playing(&self) -> bool {
        self.started_at.is_some()
    }

    fn set_listener(&mut self, listener: Option<DecoderListener>) {
        self.listener = listener;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn collecting_listener() -> (DecoderListener, Arc<Mutex<Vec<DecoderEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let listener: DecoderListener = Arc::new(move |e| {
            sink.lock().unwrap().push(e);
        });
        (listener, events)
    }

    #[test]
    fn test_needs_source_surface_and_play_intent() {
        let mut dec = ClockDecoder::new();
        dec.set_source(Path::new("videos/a.mp4"));
        dec.prepare();
        dec.set_play_when_ready(true);
        assert!(!dec.is_playing(), "no surface yet");

        dec.set_surface(Some(SurfaceHandle(1)));
        assert!(dec.is_playing());
    }

    #[test]
    fn test_first_frame_fires_once_per_source() {
        let (listener, events) = collecting_listener();
        let mut dec = ClockDecoder::new();
        dec.set_listener(Some(listener));

        dec.set_source(Path::new("a.mp4"));
        dec.prepare();
        dec.set_surface(Some(SurfaceHandle(1)));
        dec.set_play_when_ready(true);

        dec.pause();
        dec.set_play_when_ready(true);

        let count = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, DecoderEvent::FirstFrameRendered))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_pause_freezes_position() {
        let mut dec = ClockDecoder::new();
        dec.set_source(Path::new("a.mp4"));
        dec.prepare();
        dec.set_surface(Some(SurfaceHandle(1)));
        dec.set_play_when_ready(true);

        std::thread::sleep(Duration::from_millis(20));
        dec.pause();
        let frozen = dec.position_ms();
        assert!(frozen >= 20);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(dec.position_ms(), frozen);
    }

    #[test]
    fn test_seek_while_paused_stays_paused() {
        let mut dec = ClockDecoder::new();
        dec.set_source(Path::new("a.mp4"));
        dec.prepare();
        dec.seek_ms(5_000);
        assert_eq!(dec.position_ms(), 5_000);
        assert!(!dec.is_playing());
    }

    #[test]
    fn test_surface_loss_keeps_clock_running() {
        let mut dec = ClockDecoder::new();
        dec.set_source(Path::new("a.mp4"));
        dec.prepare();
        dec.set_surface(Some(SurfaceHandle(1)));
        dec.set_play_when_ready(true);

        dec.set_surface(None);
        assert!(dec.is_playing());
    }

    #[test]
    fn test_prepare_without_source_reports_error() {
        let (listener, events) = collecting_listener();
        let mut dec = ClockDecoder::new();
        dec.set_listener(Some(listener));
        dec.prepare();

        assert!(
            events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, DecoderEvent::Error(_)))
        );
    }
}
