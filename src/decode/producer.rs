//! Ahead-of-time decode loop.
//!
//! Keeps both history buffers at or above their low-watermarks by pulling
//! from a [`MediaSource`]. The watermark re-check at the top of the loop is
//! the only throttle; a buffer can overshoot its watermark while the other one
//! is still filling.

use std::thread;

use crate::audio::mixer::mix_samples;
use crate::core::config::PlaybackSettings;
use crate::core::time::Seconds;
use crate::decode::source::{DecodedUnit, MediaSource};
use crate::playback::history::HistoryUnit;
use crate::playback::state::SharedState;

/// Why the producer returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// Backend reported a clean end of stream
    EndOfStream,
    /// Kill was requested by the host or the render worker
    Killed,
    /// Backend reported an error; recorded as a bad termination
    BackendError,
}

/// Decode producer state for one run
pub struct Producer<'a> {
    shared: &'a SharedState,
    settings: &'a PlaybackSettings,
    /// Exact payload size the pixel sink accepts
    frame_len: usize,
    last_video_ts: Option<Seconds>,
    last_audio_ts: Option<Seconds>,
}

impl<'a> Producer<'a> {
    pub fn new(shared: &'a SharedState, settings: &'a PlaybackSettings, frame_len: usize) -> Self {
        Self {
            shared,
            settings,
            frame_len,
            last_video_ts: None,
            last_audio_ts: None,
        }
    }

    /// Run until end of stream, a backend error, or a kill request.
    /// Does not touch `decoder_finished`; the thread runner sets it.
    pub fn run(&mut self, source: &mut dyn MediaSource) -> ProducerExit {
        let lifecycle = &self.shared.lifecycle;
        tracing::debug!("Producer started");

        loop {
            if lifecycle.kill_requested() {
                tracing::debug!("Producer killed");
                return ProducerExit::Killed;
            }

            while self.below_watermark() {
                if lifecycle.kill_requested() {
                    tracing::debug!("Producer killed while filling");
                    return ProducerExit::Killed;
                }

                match source.next_unit() {
                    Ok(Some(unit)) => self.push(unit),
                    Ok(None) => {
                        tracing::info!("Producer reached end of stream");
                        return ProducerExit::EndOfStream;
                    }
                    Err(err) => {
                        tracing::error!("Decode failed: {}", err);
                        lifecycle.mark_bad_termination(err.code(), err.to_string());
                        return ProducerExit::BackendError;
                    }
                }
            }

            thread::sleep(self.settings.poll_interval);
        }
    }

    fn below_watermark(&self) -> bool {
        self.shared.video_len() < self.settings.video_low_watermark()
            || self.shared.audio_len() < self.settings.audio_low_watermark()
    }

    /// Buffer one unit. The kill flag is re-checked under the buffer's write
    /// lock so nothing lands after the render worker cleared on failure.
    fn push(&mut self, unit: DecodedUnit) {
        tracing::trace!("Buffering unit at {:.3}s", unit.timestamp());
        match unit {
            DecodedUnit::Video {
                mut pixels,
                timestamp,
            } => {
                if pixels.len() != self.frame_len {
                    tracing::trace!(
                        "Resizing video payload from {} to {} bytes",
                        pixels.len(),
                        self.frame_len
                    );
                    pixels.resize(self.frame_len, 0);
                }
                let timestamp = monotonic(&mut self.last_video_ts, timestamp);
                let mut video = self.shared.video.write();
                if self.shared.lifecycle.kill_requested() {
                    tracing::trace!("Dropping video unit decoded after kill");
                    return;
                }
                video.push(HistoryUnit::new(pixels, timestamp));
            }
            DecodedUnit::Audio { samples, timestamp } => {
                // Volume is sampled per unit; buffered units keep their gain
                let payload = mix_samples(&samples, self.shared.volume.get());
                let timestamp = monotonic(&mut self.last_audio_ts, timestamp);
                let mut audio = self.shared.audio.write();
                if self.shared.lifecycle.kill_requested() {
                    tracing::trace!("Dropping audio unit decoded after kill");
                    return;
                }
                audio.push(HistoryUnit::new(payload, timestamp));
            }
        }
    }
}

/// Clamp a timestamp so a stream never goes backwards
fn monotonic(last: &mut Option<Seconds>, timestamp: Seconds) -> Seconds {
    let timestamp = match *last {
        Some(previous) if !(timestamp >= previous) => {
            tracing::trace!("Timestamp {} regressed behind {}", timestamp, previous);
            previous
        }
        _ => timestamp,
    };
    *last = Some(timestamp);
    timestamp
}
