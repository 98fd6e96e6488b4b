//! End-to-end runs of the player over scripted sources and recording sinks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use aotplay::audio::mixer::samples_from_payload;
use aotplay::audio::{AudioError, AudioSink, AudioSpec};
use aotplay::core::config::PlaybackSettings;
use aotplay::decode::{DecodeError, DecodedUnit, MediaSource};
use aotplay::render::{AlwaysFocused, FocusProbe, PixelSink, SharedFocus, SinkError};
use aotplay::{Phase, PlaybackStatus, Player};

const FRAME_SPACING: f64 = 0.05;

type Step = Result<Option<DecodedUnit>, DecodeError>;

/// Replays a fixed script. Pulls beyond `allowed` block until the test
/// raises the allowance or a few seconds pass.
struct ScriptedSource {
    script: VecDeque<Step>,
    pulled: usize,
    allowed: Arc<AtomicUsize>,
    /// Simulated decode cost per pull
    delay: Duration,
}

impl ScriptedSource {
    fn new(script: Vec<Step>) -> Self {
        Self {
            script: script.into(),
            pulled: 0,
            allowed: Arc::new(AtomicUsize::new(usize::MAX)),
            delay: Duration::ZERO,
        }
    }

    fn slow(script: Vec<Step>, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(script)
        }
    }

    fn gated(script: Vec<Step>, allowed: usize) -> Self {
        let source = Self::new(script);
        source.allowed.store(allowed, Ordering::SeqCst);
        source
    }
}

impl MediaSource for ScriptedSource {
    fn next_unit(&mut self) -> Result<Option<DecodedUnit>, DecodeError> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.pulled >= self.allowed.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(self.delay);
        self.pulled += 1;
        self.script.pop_front().unwrap_or(Ok(None))
    }
}

/// `pairs` video/audio units, frame `i` stamped `(i + 1) * FRAME_SPACING`
/// and filled with byte `i`
fn interleaved(pairs: usize, sample: f32) -> Vec<Step> {
    let mut script = Vec::new();
    for i in 0..pairs {
        let timestamp = (i + 1) as f64 * FRAME_SPACING;
        script.push(Ok(Some(DecodedUnit::Video {
            pixels: vec![i as u8; 16],
            timestamp,
        })));
        script.push(Ok(Some(DecodedUnit::Audio {
            samples: vec![sample; 4],
            timestamp,
        })));
    }
    script
}

#[derive(Clone, Default)]
struct Recording {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    audio: Arc<Mutex<Vec<Vec<u8>>>>,
    audio_paused: Arc<AtomicBool>,
}

impl Recording {
    fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }
}

/// 2x2 sink that records every accepted frame, optionally refusing writes
/// from the `fail_on`-th call on
struct RecordingPixelSink {
    recording: Recording,
    calls: usize,
    fail_on: Option<usize>,
}

impl PixelSink for RecordingPixelSink {
    fn width(&self) -> u32 {
        2
    }

    fn height(&self) -> u32 {
        2
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn write_flipped(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.calls += 1;
        if self.fail_on.is_some_and(|n| self.calls >= n) {
            return Err(SinkError::Disposed);
        }
        self.recording.frames.lock().push(data.to_vec());
        Ok(())
    }
}

struct RecordingAudioSink {
    recording: Recording,
}

impl AudioSink for RecordingAudioSink {
    fn spec(&self) -> AudioSpec {
        AudioSpec::default()
    }

    fn queue(&mut self, payload: &[u8]) -> Result<(), AudioError> {
        self.recording.audio.lock().push(payload.to_vec());
        Ok(())
    }

    fn pause(&mut self) {
        self.recording.audio_paused.store(true, Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.recording.audio_paused.store(false, Ordering::SeqCst);
    }
}

fn player(
    source: ScriptedSource,
    volume: i32,
    fail_on: Option<usize>,
    focus: Arc<dyn FocusProbe>,
    watermark: usize,
) -> (Player, Recording) {
    let recording = Recording::default();
    let player = Player::from_parts(
        Box::new(source),
        volume,
        Box::new(RecordingPixelSink {
            recording: recording.clone(),
            calls: 0,
            fail_on,
        }),
        Box::new(RecordingAudioSink {
            recording: recording.clone(),
        }),
        focus,
        PlaybackSettings::default().with_watermark(watermark),
    )
    .unwrap();
    (player, recording)
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(1));
    }
}

fn wait_finished(player: &Player) {
    wait_until(|| player.poll_state() == PlaybackStatus::Finished);
}

#[test]
fn test_plays_every_frame_in_order() {
    let (mut player, recording) = player(
        ScriptedSource::new(interleaved(6, 0.5)),
        128,
        None,
        Arc::new(AlwaysFocused),
        10,
    );
    player.start_render().unwrap();
    wait_finished(&player);

    let firsts: Vec<u8> = recording.frames.lock().iter().map(|f| f[0]).collect();
    assert_eq!(firsts, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(recording.audio.lock().len(), 6);
    assert_eq!(player.phase(), Phase::Completed);
    assert!(!player.was_abnormal_termination());
    assert_eq!(player.last_error(), None);
    assert_eq!(player.last_error_code(), 0);
}

#[test]
fn test_render_waits_for_both_watermarks() {
    let source = ScriptedSource::gated(interleaved(12, 0.5), 18);
    let allowed = Arc::clone(&source.allowed);
    let (mut player, recording) = player(source, 128, None, Arc::new(AlwaysFocused), 10);
    player.start_render().unwrap();

    // nine units of each kind are buffered, one short of the watermark
    wait_until(|| player.buffered() == (9, 9));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(recording.frame_count(), 0);
    assert_eq!(player.phase(), Phase::AwaitingFill);

    allowed.store(usize::MAX, Ordering::SeqCst);
    wait_finished(&player);
    assert_eq!(recording.frame_count(), 12);
}

#[test]
fn test_sink_failure_stops_after_four_frames() {
    let (mut player, recording) = player(
        ScriptedSource::new(interleaved(8, 0.5)),
        128,
        Some(5),
        Arc::new(AlwaysFocused),
        10,
    );
    player.start_render().unwrap();
    wait_finished(&player);

    assert_eq!(recording.frame_count(), 4);
    assert_eq!(player.poll_state(), PlaybackStatus::Finished);
    assert!(!player.was_abnormal_termination());
    assert!(player.last_error().is_some());
    assert_eq!(player.phase(), Phase::Aborted);
    assert_eq!(player.buffered(), (0, 0));
}

#[test]
fn test_sink_failure_leaves_nothing_buffered_while_decoding() {
    let (mut player, recording) = player(
        ScriptedSource::slow(interleaved(200, 0.5), Duration::from_millis(3)),
        128,
        Some(1),
        Arc::new(AlwaysFocused),
        10,
    );
    player.start_render().unwrap();
    wait_finished(&player);

    assert_eq!(recording.frame_count(), 0);
    assert_eq!(player.phase(), Phase::Aborted);
    assert_eq!(player.buffered(), (0, 0));
    assert!(!player.was_abnormal_termination());
}

#[test]
fn test_backend_error_still_renders_buffered_units() {
    let mut script = interleaved(6, 0.5);
    script.push(Err(DecodeError::Backend("corrupt packet".into())));
    script.extend(interleaved(2, 0.5));
    let (mut player, recording) =
        player(ScriptedSource::new(script), 128, None, Arc::new(AlwaysFocused), 20);
    player.start_render().unwrap();
    wait_finished(&player);

    assert!(player.was_abnormal_termination());
    assert_eq!(player.last_error_code(), -1);
    assert!(player.last_error().unwrap().contains("corrupt packet"));
    assert_eq!(recording.frame_count(), 6);
    assert_eq!(recording.audio.lock().len(), 6);
    assert_eq!(player.phase(), Phase::Aborted);
}

#[test]
fn test_volume_zero_queues_silence() {
    let (mut player, recording) = player(
        ScriptedSource::new(interleaved(3, 0.5)),
        0,
        None,
        Arc::new(AlwaysFocused),
        10,
    );
    player.start_render().unwrap();
    wait_finished(&player);

    let audio = recording.audio.lock();
    assert_eq!(audio.len(), 3);
    assert!(audio.iter().flatten().all(|&byte| byte == 0));
}

#[test]
fn test_full_volume_passes_samples_through() {
    let (mut player, recording) = player(
        ScriptedSource::new(interleaved(3, 0.5)),
        128,
        None,
        Arc::new(AlwaysFocused),
        10,
    );
    player.start_render().unwrap();
    wait_finished(&player);

    for payload in recording.audio.lock().iter() {
        assert!(samples_from_payload(payload).all(|sample| sample == 0.5));
    }
}

#[test]
fn test_focus_loss_freezes_playback() {
    let focus = SharedFocus::new(true);
    let (mut player, recording) = player(
        ScriptedSource::new(interleaved(6, 0.5)),
        128,
        None,
        Arc::new(focus.clone()),
        10,
    );
    player.start_render().unwrap();

    wait_until(|| recording.frame_count() >= 1);
    focus.set(false);
    // a frame already being paced may still land
    wait_until(|| recording.audio_paused.load(Ordering::SeqCst));
    let frozen_at = recording.frame_count();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(recording.frame_count(), frozen_at);
    assert_eq!(player.phase(), Phase::PausedByFocus);

    focus.set(true);
    wait_finished(&player);
    assert!(!recording.audio_paused.load(Ordering::SeqCst));
    assert_eq!(recording.frame_count(), 6);
    assert_eq!(player.stats().frames_skipped, 0);
}

#[test]
fn test_close_mid_playback() {
    let (mut player, recording) = player(
        ScriptedSource::new(interleaved(40, 0.5)),
        128,
        None,
        Arc::new(AlwaysFocused),
        10,
    );
    player.start_render().unwrap();
    wait_until(|| recording.frame_count() >= 2);

    player.close();
    assert_eq!(player.poll_state(), PlaybackStatus::Finished);
    assert!(recording.frame_count() < 40);
    assert!(!player.was_abnormal_termination());
}
