//! Destination for mixed audio units.

use crate::audio::player::AudioError;

/// Output format the producer resamples to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

/// Queue-based PCM output.
///
/// Payloads are interleaved native-endian f32 in [`AudioSpec`] layout and play
/// asynchronously after `queue` returns.
pub trait AudioSink: Send {
    fn spec(&self) -> AudioSpec;

    fn queue(&mut self, payload: &[u8]) -> Result<(), AudioError>;

    /// Stop consuming queued audio and output silence
    fn pause(&mut self);

    fn resume(&mut self);
}
