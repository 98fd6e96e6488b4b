//! Render worker: paces buffered units against the wall clock and delivers
//! them to the pixel and audio sinks.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::audio::sink::AudioSink;
use crate::core::config::PlaybackSettings;
use crate::core::time::Seconds;
use crate::playback::state::{Phase, SharedState};
use crate::playback::sync::SyncClock;
use crate::render::focus::FocusProbe;
use crate::render::sink::PixelSink;

/// Why the render worker returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderExit {
    /// Producer finished and every video unit was consumed
    Completed,
    /// Kill was requested
    Killed,
    /// The pixel sink rejected a write
    SinkFailed,
}

/// Consumer side of the pipeline. Owns both sinks for the whole run.
pub struct Renderer {
    shared: Arc<SharedState>,
    settings: PlaybackSettings,
    pixel_sink: Box<dyn PixelSink>,
    audio_sink: Box<dyn AudioSink>,
    focus: Arc<dyn FocusProbe>,
}

impl Renderer {
    pub fn new(
        shared: Arc<SharedState>,
        settings: PlaybackSettings,
        pixel_sink: Box<dyn PixelSink>,
        audio_sink: Box<dyn AudioSink>,
        focus: Arc<dyn FocusProbe>,
    ) -> Self {
        Self {
            shared,
            settings,
            pixel_sink,
            audio_sink,
            focus,
        }
    }

    /// Run until the producer is done and the video buffer is empty, a kill
    /// request, or a sink failure. Does not touch `render_finished`.
    pub fn run(&mut self) -> RenderExit {
        let lifecycle = &self.shared.lifecycle;
        lifecycle.set_phase(Phase::AwaitingFill);

        if !self.wait_for_preroll() {
            tracing::debug!("Render killed during pre-roll");
            return RenderExit::Killed;
        }

        let mut clock = SyncClock::start_now();
        lifecycle.set_phase(Phase::Playing);
        tracing::info!(
            "Render started with {} video and {} audio units buffered",
            self.shared.video_len(),
            self.shared.audio_len()
        );

        loop {
            if self.shared.lifecycle.kill_requested() {
                tracing::debug!("Render killed");
                return RenderExit::Killed;
            }

            let producer_done = self.shared.lifecycle.decoder_finished();
            if producer_done {
                if self.shared.video.read().is_empty() {
                    self.flush_remaining_audio();
                    tracing::info!("Render drained all buffered units");
                    return RenderExit::Completed;
                }
                self.shared.lifecycle.set_phase(Phase::Draining);
            }

            if !self.hold_while_unfocused(&mut clock, producer_done) {
                tracing::debug!("Render killed while unfocused");
                return RenderExit::Killed;
            }

            let elapsed = clock.elapsed();
            let head = {
                let mut video = self.shared.video.write();
                let dropped = video.drop_stale(elapsed, clock.time_shift());
                if dropped > 0 {
                    tracing::debug!("Skipped {} late video units", dropped);
                    self.shared.stats.record_skipped(dropped);
                }
                video.front().map(|unit| unit.timestamp)
            };

            let Some(timestamp) = head else {
                thread::sleep(self.settings.poll_interval);
                continue;
            };

            // Only this worker pops, so the head stays put while unlocked
            let Some(elapsed) = self.wait_until_due(&clock, timestamp) else {
                tracing::debug!("Render killed while pacing");
                return RenderExit::Killed;
            };

            self.flush_due_audio(&clock, elapsed);

            if let Err(exit) = self.present_head() {
                return exit;
            }
        }
    }

    /// Block until both buffers reach their low-watermarks or the producer
    /// has stopped. Returns false on kill.
    fn wait_for_preroll(&self) -> bool {
        let video_mark = self.settings.video_low_watermark();
        let audio_mark = self.settings.audio_low_watermark();
        loop {
            let lifecycle = &self.shared.lifecycle;
            if lifecycle.kill_requested() {
                return false;
            }
            if lifecycle.decoder_finished() {
                return true;
            }
            if self.shared.video_len() >= video_mark && self.shared.audio_len() >= audio_mark {
                return true;
            }
            thread::sleep(self.settings.poll_interval);
        }
    }

    /// Freeze playback while the target window is unfocused. The paused wall
    /// time is added to the clock's shift on resume. Returns false on kill.
    fn hold_while_unfocused(&mut self, clock: &mut SyncClock, draining: bool) -> bool {
        if self.focus.is_focused() {
            return true;
        }

        let paused_at = Instant::now();
        self.audio_sink.pause();
        self.shared.lifecycle.set_phase(Phase::PausedByFocus);
        tracing::debug!("Focus lost, pausing");

        let mut killed = false;
        while !self.focus.is_focused() {
            if self.shared.lifecycle.kill_requested() {
                killed = true;
                break;
            }
            thread::sleep(self.settings.poll_interval);
        }

        clock.add_pause(paused_at.elapsed());
        self.audio_sink.resume();
        if killed {
            return false;
        }

        self.shared.lifecycle.set_phase(if draining {
            Phase::Draining
        } else {
            Phase::Playing
        });
        tracing::debug!("Focus regained, time shift now {:.3}s", clock.time_shift());
        true
    }

    /// Poll until `timestamp` is due. Returns the elapsed time it became due
    /// at, or `None` on kill.
    fn wait_until_due(&self, clock: &SyncClock, timestamp: Seconds) -> Option<Seconds> {
        loop {
            let elapsed = clock.elapsed();
            if clock.is_due(timestamp, elapsed) {
                return Some(elapsed);
            }
            if self.shared.lifecycle.kill_requested() {
                return None;
            }
            thread::sleep(self.settings.poll_interval);
        }
    }

    fn flush_due_audio(&mut self, clock: &SyncClock, elapsed: Seconds) {
        let due = self
            .shared
            .audio
            .write()
            .drain_due(elapsed, clock.time_shift());
        self.queue_audio(due.iter().map(|unit| unit.payload.as_slice()));
    }

    fn flush_remaining_audio(&mut self) {
        let rest = self.shared.audio.write().drain_all();
        if !rest.is_empty() {
            tracing::debug!("Queueing {} trailing audio units", rest.len());
        }
        self.queue_audio(rest.iter().map(|unit| unit.payload.as_slice()));
    }

    fn queue_audio<'a>(&mut self, payloads: impl Iterator<Item = &'a [u8]>) {
        let mut queued = 0;
        for payload in payloads {
            match self.audio_sink.queue(payload) {
                Ok(()) => queued += 1,
                Err(err) => tracing::warn!("Audio queue failed: {}", err),
            }
        }
        self.shared.stats.record_audio(queued);
    }

    /// Write the head video unit under the video write lock and pop it. On a
    /// sink failure both buffers are cleared and a kill is requested.
    fn present_head(&mut self) -> Result<(), RenderExit> {
        let shared = &self.shared;
        let mut video = shared.video.write();
        let result = match video.front() {
            Some(unit) => self.pixel_sink.write_flipped(&unit.payload),
            None => return Ok(()),
        };

        match result {
            Ok(()) => {
                video.pop_front();
                shared.stats.record_written();
                Ok(())
            }
            Err(err) => {
                // Kill first so the producer drops anything it is still decoding
                shared.lifecycle.request_kill();
                video.clear();
                drop(video);
                shared.audio.write().clear();
                tracing::warn!("Pixel sink rejected frame: {}", err);
                shared.lifecycle.mark_sink_failed(err.to_string());
                Err(RenderExit::SinkFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::AudioError;
    use crate::audio::sink::AudioSpec;
    use crate::playback::history::HistoryUnit;
    use crate::render::focus::{AlwaysFocused, SharedFocus};
    use crate::render::sink::SinkError;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Recorder {
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
        audio: Arc<Mutex<Vec<Vec<u8>>>>,
        pauses: Arc<Mutex<usize>>,
    }

    struct TestPixelSink {
        recorder: Recorder,
        fail_after: Option<usize>,
    }

    impl PixelSink for TestPixelSink {
        fn width(&self) -> u32 {
            1
        }

        fn height(&self) -> u32 {
            1
        }

        fn is_valid(&self) -> bool {
            true
        }

        fn write_flipped(&mut self, pixels: &[u8]) -> Result<(), SinkError> {
            let mut frames = self.recorder.frames.lock();
            if self.fail_after == Some(frames.len()) {
                return Err(SinkError::Disposed);
            }
            frames.push(pixels.to_vec());
            Ok(())
        }
    }

    struct TestAudioSink {
        recorder: Recorder,
    }

    impl AudioSink for TestAudioSink {
        fn spec(&self) -> AudioSpec {
            AudioSpec::default()
        }

        fn queue(&mut self, payload: &[u8]) -> Result<(), AudioError> {
            self.recorder.audio.lock().push(payload.to_vec());
            Ok(())
        }

        fn pause(&mut self) {
            *self.recorder.pauses.lock() += 1;
        }

        fn resume(&mut self) {}
    }

    fn renderer(
        shared: &Arc<SharedState>,
        recorder: &Recorder,
        fail_after: Option<usize>,
        focus: Arc<dyn FocusProbe>,
    ) -> Renderer {
        Renderer::new(
            Arc::clone(shared),
            PlaybackSettings::default().with_watermark(2),
            Box::new(TestPixelSink {
                recorder: recorder.clone(),
                fail_after,
            }),
            Box::new(TestAudioSink {
                recorder: recorder.clone(),
            }),
            focus,
        )
    }

    fn fill(shared: &SharedState, stamps: &[Seconds]) {
        for (i, &ts) in stamps.iter().enumerate() {
            shared.video.write().push(HistoryUnit::new(vec![i as u8], ts));
            shared.audio.write().push(HistoryUnit::new(vec![i as u8], ts));
        }
    }

    #[test]
    fn test_renders_everything_then_completes() {
        let shared = Arc::new(SharedState::new(1.0));
        fill(&shared, &[0.05, 0.1, 0.15]);
        shared.lifecycle.mark_decoder_finished();
        let recorder = Recorder::default();

        let exit = renderer(&shared, &recorder, None, Arc::new(AlwaysFocused)).run();

        assert_eq!(exit, RenderExit::Completed);
        assert_eq!(*recorder.frames.lock(), vec![vec![0], vec![1], vec![2]]);
        assert_eq!(recorder.audio.lock().len(), 3);
        assert_eq!(shared.audio_len(), 0);
        assert_eq!(shared.stats.snapshot().frames_written, 3);
    }

    #[test]
    fn test_late_units_are_skipped() {
        let shared = Arc::new(SharedState::new(1.0));
        // the first unit is due at the same instant as the second; both are
        // behind the clock by the time the third is paced
        fill(&shared, &[0.0, 0.0, 0.2]);
        shared.lifecycle.mark_decoder_finished();
        let recorder = Recorder::default();

        let exit = renderer(&shared, &recorder, None, Arc::new(AlwaysFocused)).run();

        assert_eq!(exit, RenderExit::Completed);
        let frames = recorder.frames.lock();
        assert_eq!(frames.last(), Some(&vec![2]));
        let snapshot = shared.stats.snapshot();
        assert_eq!(snapshot.frames_written + snapshot.frames_skipped, 3);
    }

    #[test]
    fn test_sink_failure_clears_and_kills() {
        let shared = Arc::new(SharedState::new(1.0));
        fill(&shared, &[0.05, 0.1, 0.15, 0.2]);
        shared.lifecycle.mark_decoder_finished();
        let recorder = Recorder::default();

        let exit = renderer(&shared, &recorder, Some(2), Arc::new(AlwaysFocused)).run();

        assert_eq!(exit, RenderExit::SinkFailed);
        assert_eq!(recorder.frames.lock().len(), 2);
        assert_eq!(shared.video_len(), 0);
        assert_eq!(shared.audio_len(), 0);
        assert!(shared.lifecycle.kill_requested());
        assert!(!shared.lifecycle.was_bad_termination());
        assert!(shared.lifecycle.last_error().is_some());
    }

    #[test]
    fn test_waits_for_preroll() {
        let shared = Arc::new(SharedState::new(1.0));
        fill(&shared, &[0.05]);
        let recorder = Recorder::default();
        let mut worker = renderer(&shared, &recorder, None, Arc::new(AlwaysFocused));
        let handle = thread::spawn(move || worker.run());

        thread::sleep(Duration::from_millis(50));
        assert!(recorder.frames.lock().is_empty());
        assert_eq!(shared.lifecycle.phase(), Phase::AwaitingFill);

        fill(&shared, &[0.1]);
        shared.lifecycle.mark_decoder_finished();
        assert_eq!(handle.join().unwrap(), RenderExit::Completed);
        assert_eq!(recorder.frames.lock().len(), 2);
    }

    #[test]
    fn test_kill_during_preroll() {
        let shared = Arc::new(SharedState::new(1.0));
        let recorder = Recorder::default();
        let mut worker = renderer(&shared, &recorder, None, Arc::new(AlwaysFocused));
        let handle = thread::spawn(move || worker.run());

        thread::sleep(Duration::from_millis(10));
        shared.lifecycle.request_kill();
        assert_eq!(handle.join().unwrap(), RenderExit::Killed);
    }

    #[test]
    fn test_focus_loss_pauses_audio_and_holds_frames() {
        let shared = Arc::new(SharedState::new(1.0));
        fill(&shared, &[0.05, 0.1]);
        shared.lifecycle.mark_decoder_finished();
        let recorder = Recorder::default();
        let focus = SharedFocus::new(false);
        let mut worker = renderer(&shared, &recorder, None, Arc::new(focus.clone()));
        let handle = thread::spawn(move || worker.run());

        thread::sleep(Duration::from_millis(60));
        assert!(recorder.frames.lock().is_empty());
        assert_eq!(*recorder.pauses.lock(), 1);
        assert_eq!(shared.lifecycle.phase(), Phase::PausedByFocus);

        focus.set(true);
        assert_eq!(handle.join().unwrap(), RenderExit::Completed);
        // nothing went stale: the pause was absorbed by the time shift
        assert_eq!(recorder.frames.lock().len(), 2);
        assert_eq!(shared.stats.snapshot().frames_skipped, 0);
    }
}
