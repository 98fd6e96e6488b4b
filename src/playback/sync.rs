//! Wall-clock timing for the render worker.
//!
//! Playback time is the wall time since the first paced unit, minus the time
//! spent paused by focus loss. The pause is accounted as `time_shift`, which
//! is added to every unit timestamp instead of being subtracted from the
//! clock, so buffered timestamps never need rewriting.

use std::time::{Duration, Instant};

use crate::core::time::{self, Seconds};

/// Render clock with a non-decreasing pause offset
#[derive(Debug, Clone)]
pub struct SyncClock {
    start: Instant,
    time_shift: Seconds,
}

impl SyncClock {
    /// Start the clock at the current instant
    pub fn start_now() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            start,
            time_shift: time::ZERO,
        }
    }

    /// Seconds since the clock started, including paused time
    pub fn elapsed(&self) -> Seconds {
        time::from_duration(self.start.elapsed())
    }

    /// Total paused time so far
    pub fn time_shift(&self) -> Seconds {
        self.time_shift
    }

    /// Account for a focus pause of `paused` wall time
    pub fn add_pause(&mut self, paused: Duration) {
        self.time_shift += time::from_duration(paused);
    }

    /// Timestamp as compared against [`elapsed`](Self::elapsed)
    pub fn adjusted(&self, timestamp: Seconds) -> Seconds {
        timestamp + self.time_shift
    }

    /// A unit is due once its adjusted timestamp has been reached
    pub fn is_due(&self, timestamp: Seconds, elapsed: Seconds) -> bool {
        self.adjusted(timestamp) <= elapsed
    }
}
