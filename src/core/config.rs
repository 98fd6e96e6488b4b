//! Playback settings shared by the producer and the render worker.

use std::time::Duration;

/// Default low-watermark for both history buffers
pub const DEFAULT_WATERMARK: usize = 120;

/// Default polling granularity for every cooperative wait
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Tunables for one playback pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    /// Minimum number of buffered video units the producer tries to keep
    pub video_watermark: usize,
    /// Minimum number of buffered audio units the producer tries to keep
    pub audio_watermark: usize,
    /// Sleep granularity of the pre-roll, pacing, focus and idle waits
    pub poll_interval: Duration,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            video_watermark: DEFAULT_WATERMARK,
            audio_watermark: DEFAULT_WATERMARK,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PlaybackSettings {
    /// Same watermark for both buffers
    pub fn with_watermark(mut self, units: usize) -> Self {
        self.video_watermark = units;
        self.audio_watermark = units;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Video watermark as used by the workers; never below one unit, or the
    /// producer would never pull anything.
    pub fn video_low_watermark(&self) -> usize {
        self.video_watermark.max(1)
    }

    /// Audio watermark as used by the workers, never below one unit
    pub fn audio_low_watermark(&self) -> usize {
        self.audio_watermark.max(1)
    }
}
