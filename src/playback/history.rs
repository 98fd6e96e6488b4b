//! Timestamp-ordered FIFO of decoded, sink-ready units.
//!
//! The producer appends at the back and the render worker consumes from the
//! front. The nominal size is a low-watermark, not a cap: nothing here refuses
//! a push.

use std::collections::VecDeque;

use crate::core::time::Seconds;

/// One decoded unit ready for a sink
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryUnit {
    /// BGRA pixels for video, native-endian f32 PCM for audio
    pub payload: Vec<u8>,
    /// Presentation timestamp in seconds
    pub timestamp: Seconds,
}

impl HistoryUnit {
    pub fn new(payload: Vec<u8>, timestamp: Seconds) -> Self {
        Self { payload, timestamp }
    }

    /// Timestamp shifted by the accumulated focus-loss pause
    #[inline]
    pub fn adjusted(&self, time_shift: Seconds) -> Seconds {
        self.timestamp + time_shift
    }
}

/// Bounded-by-convention history of decoded units
#[derive(Debug, Default)]
pub struct HistoryBuffer {
    units: VecDeque<HistoryUnit>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a unit. Callers push in non-decreasing timestamp order.
    pub fn push(&mut self, unit: HistoryUnit) {
        debug_assert!(
            self.last_timestamp().map_or(true, |last| unit.timestamp >= last),
            "history timestamps must not go backwards"
        );
        self.units.push_back(unit);
    }

    pub fn front(&self) -> Option<&HistoryUnit> {
        self.units.front()
    }

    pub fn pop_front(&mut self) -> Option<HistoryUnit> {
        self.units.pop_front()
    }

    /// Timestamp of the most recently pushed unit
    pub fn last_timestamp(&self) -> Option<Seconds> {
        self.units.back().map(|unit| unit.timestamp)
    }

    /// Drop the contiguous prefix of units that are already late, i.e. whose
    /// adjusted timestamp is strictly behind `elapsed`. Stops at the first unit
    /// that is not yet due. Returns how many units were dropped.
    pub fn drop_stale(&mut self, elapsed: Seconds, time_shift: Seconds) -> usize {
        let mut dropped = 0;
        while self
            .units
            .front()
            .is_some_and(|unit| unit.adjusted(time_shift) < elapsed)
        {
            self.units.pop_front();
            dropped += 1;
        }
        dropped
    }

    /// Remove and return, in order, every head unit whose adjusted timestamp
    /// has been reached.
    pub fn drain_due(&mut self, elapsed: Seconds, time_shift: Seconds) -> Vec<HistoryUnit> {
        let due = self
            .units
            .iter()
            .take_while(|unit| unit.adjusted(time_shift) <= elapsed)
            .count();
        self.units.drain(..due).collect()
    }

    /// Remove everything that is left
    pub fn drain_all(&mut self) -> Vec<HistoryUnit> {
        self.units.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
