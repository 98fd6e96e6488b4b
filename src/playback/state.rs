//! Lifecycle flags and the shared state handed to both workers.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::audio::mixer::VolumeControl;
use crate::playback::history::HistoryBuffer;

/// Coarse position in the playback state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Nothing started yet
    Idle = 0,
    /// Producer running, render not started
    Prefill = 1,
    /// Render started, waiting for the buffers to reach their watermarks
    AwaitingFill = 2,
    /// Pacing and delivering units
    Playing = 3,
    /// Host window lost focus; timeline frozen
    PausedByFocus = 4,
    /// Producer done, render emptying what is left
    Draining = 5,
    /// Both workers finished normally
    Completed = 6,
    /// Both workers finished after a backend error or a sink failure
    Aborted = 7,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Phase::Prefill,
            2 => Phase::AwaitingFill,
            3 => Phase::Playing,
            4 => Phase::PausedByFocus,
            5 => Phase::Draining,
            6 => Phase::Completed,
            7 => Phase::Aborted,
            _ => Phase::Idle,
        }
    }

    /// Check if the pipeline has stopped for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Aborted)
    }
}

/// Error recorded by a worker for the host to poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub code: i32,
    pub message: String,
}

/// Cooperative shutdown and completion flags.
///
/// `kill_requested` may be set by either worker or by the host. Each
/// `*_finished` flag is set once, by the runner of the matching worker, right
/// after the worker returns. `bad_termination` is only ever set by the
/// producer.
#[derive(Debug)]
pub struct Lifecycle {
    kill_requested: AtomicBool,
    decoder_finished: AtomicBool,
    render_finished: AtomicBool,
    bad_termination: AtomicBool,
    sink_failed: AtomicBool,
    phase: AtomicU8,
    last_error: Mutex<Option<LastError>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            kill_requested: AtomicBool::new(false),
            decoder_finished: AtomicBool::new(false),
            render_finished: AtomicBool::new(false),
            bad_termination: AtomicBool::new(false),
            sink_failed: AtomicBool::new(false),
            phase: AtomicU8::new(Phase::Idle as u8),
            last_error: Mutex::new(None),
        }
    }

    pub fn request_kill(&self) {
        self.kill_requested.store(true, Ordering::SeqCst);
    }

    pub fn kill_requested(&self) -> bool {
        self.kill_requested.load(Ordering::SeqCst)
    }

    pub fn mark_decoder_finished(&self) {
        self.decoder_finished.store(true, Ordering::SeqCst);
    }

    pub fn decoder_finished(&self) -> bool {
        self.decoder_finished.load(Ordering::SeqCst)
    }

    pub fn mark_render_finished(&self) {
        self.render_finished.store(true, Ordering::SeqCst);
    }

    pub fn render_finished(&self) -> bool {
        self.render_finished.load(Ordering::SeqCst)
    }

    /// Both workers have returned
    pub fn is_completed(&self) -> bool {
        self.decoder_finished() && self.render_finished()
    }

    /// Producer stopped on a backend error. Records the error as well.
    pub fn mark_bad_termination(&self, code: i32, message: impl Into<String>) {
        self.record_error(code, message);
        self.bad_termination.store(true, Ordering::SeqCst);
    }

    pub fn was_bad_termination(&self) -> bool {
        self.bad_termination.load(Ordering::SeqCst)
    }

    /// Render worker stopped because the pixel sink refused a write. This is
    /// an abort, but not a bad termination.
    pub fn mark_sink_failed(&self, message: impl Into<String>) {
        self.record_error(0, message);
        self.sink_failed.store(true, Ordering::SeqCst);
    }

    pub fn record_error(&self, code: i32, message: impl Into<String>) {
        *self.last_error.lock() = Some(LastError {
            code,
            message: message.into(),
        });
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.last_error.lock().clone()
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    /// Current phase. Once both workers are done this reports `Completed` or
    /// `Aborted` regardless of the last phase a worker wrote.
    pub fn phase(&self) -> Phase {
        if self.is_completed() {
            if self.was_bad_termination() || self.sink_failed.load(Ordering::SeqCst) {
                Phase::Aborted
            } else {
                Phase::Completed
            }
        } else {
            Phase::from_u8(self.phase.load(Ordering::SeqCst))
        }
    }
}

/// Render counters, readable while playing
#[derive(Debug, Default)]
pub struct PlaybackStats {
    frames_written: AtomicU64,
    frames_skipped: AtomicU64,
    audio_units: AtomicU64,
}

/// Point-in-time copy of [`PlaybackStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_written: u64,
    pub frames_skipped: u64,
    pub audio_units: u64,
}

impl PlaybackStats {
    pub fn record_written(&self) {
        self.frames_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, frames: usize) {
        self.frames_skipped
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    pub fn record_audio(&self, units: usize) {
        self.audio_units.fetch_add(units as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_written: self.frames_written.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            audio_units: self.audio_units.load(Ordering::Relaxed),
        }
    }
}

/// State shared by the producer, the render worker and the host handle
#[derive(Debug, Default)]
pub struct SharedState {
    pub video: RwLock<HistoryBuffer>,
    pub audio: RwLock<HistoryBuffer>,
    pub lifecycle: Lifecycle,
    pub volume: VolumeControl,
    pub stats: PlaybackStats,
}

impl SharedState {
    pub fn new(initial_volume: f32) -> Self {
        Self {
            video: RwLock::new(HistoryBuffer::new()),
            audio: RwLock::new(HistoryBuffer::new()),
            lifecycle: Lifecycle::new(),
            volume: VolumeControl::new(initial_volume),
            stats: PlaybackStats::default(),
        }
    }

    /// Buffered video unit count (shared lock only)
    pub fn video_len(&self) -> usize {
        self.video.read().len()
    }

    /// Buffered audio unit count (shared lock only)
    pub fn audio_len(&self) -> usize {
        self.audio.read().len()
    }

    /// Drop everything still buffered, video first
    pub fn clear_buffers(&self) {
        self.video.write().clear();
        self.audio.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_needs_both_workers() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.is_completed());
        lifecycle.mark_decoder_finished();
        assert!(!lifecycle.is_completed());
        lifecycle.mark_render_finished();
        assert!(lifecycle.is_completed());
    }

    #[test]
    fn test_bad_termination_records_error() {
        let lifecycle = Lifecycle::new();
        lifecycle.mark_bad_termination(-5, "I/O error");
        assert!(lifecycle.was_bad_termination());
        let error = lifecycle.last_error().unwrap();
        assert_eq!(error.code, -5);
        assert_eq!(error.message, "I/O error");
    }

    #[test]
    fn test_sink_failure_is_not_bad_termination() {
        let lifecycle = Lifecycle::new();
        lifecycle.mark_sink_failed("disposed");
        assert!(!lifecycle.was_bad_termination());
        assert!(lifecycle.last_error().is_some());
    }

    #[test]
    fn test_phase_resolves_on_completion() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.phase(), Phase::Idle);
        lifecycle.set_phase(Phase::Draining);
        assert_eq!(lifecycle.phase(), Phase::Draining);

        lifecycle.mark_decoder_finished();
        lifecycle.mark_render_finished();
        assert_eq!(lifecycle.phase(), Phase::Completed);
        assert!(lifecycle.phase().is_terminal());
    }

    #[test]
    fn test_phase_aborted_after_sink_failure() {
        let lifecycle = Lifecycle::new();
        lifecycle.mark_sink_failed("write rejected");
        lifecycle.mark_decoder_finished();
        lifecycle.mark_render_finished();
        assert_eq!(lifecycle.phase(), Phase::Aborted);
    }

    #[test]
    fn test_phase_round_trip() {
        for phase in [
            Phase::Idle,
            Phase::Prefill,
            Phase::AwaitingFill,
            Phase::Playing,
            Phase::PausedByFocus,
            Phase::Draining,
            Phase::Completed,
            Phase::Aborted,
        ] {
            assert_eq!(Phase::from_u8(phase as u8), phase);
        }
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = PlaybackStats::default();
        stats.record_written();
        stats.record_written();
        stats.record_skipped(3);
        stats.record_audio(5);
        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                frames_written: 2,
                frames_skipped: 3,
                audio_units: 5,
            }
        );
    }

    #[test]
    fn test_clear_buffers() {
        use crate::playback::history::HistoryUnit;

        let shared = SharedState::new(1.0);
        shared.video.write().push(HistoryUnit::new(vec![1], 0.0));
        shared.audio.write().push(HistoryUnit::new(vec![2], 0.0));
        assert_eq!(shared.video_len(), 1);
        assert_eq!(shared.audio_len(), 1);

        shared.clear_buffers();
        assert_eq!(shared.video_len(), 0);
        assert_eq!(shared.audio_len(), 0);
    }
}
