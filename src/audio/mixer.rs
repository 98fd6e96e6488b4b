//! Volume state and the mixing step applied to each produced audio unit.

use std::sync::atomic::{AtomicU32, Ordering};

/// Upper end of the host-facing integer volume scale
pub const MAX_HOST_VOLUME: i32 = 128;

/// Volume used when nobody sets one
pub const DEFAULT_VOLUME: f32 = 0.1;

/// Live-adjustable gain in [0, 1].
///
/// Read by the producer once per audio unit, so a change only affects units
/// produced after it.
#[derive(Debug)]
pub struct VolumeControl {
    bits: AtomicU32,
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME)
    }
}

impl VolumeControl {
    pub fn new(volume: f32) -> Self {
        Self {
            bits: AtomicU32::new(clamp_volume(volume).to_bits()),
        }
    }

    /// Store a new gain, clamped to [0, 1]
    pub fn set(&self, volume: f32) {
        self.bits
            .store(clamp_volume(volume).to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Map the host's 0..=128 scale onto a gain
pub fn gain_from_host_level(level: i32) -> f32 {
    level.clamp(0, MAX_HOST_VOLUME) as f32 / MAX_HOST_VOLUME as f32
}

/// Mix interleaved f32 samples into a fresh payload at `volume`.
///
/// The destination starts as silence and the scaled source is added on top,
/// clamped to [-1, 1] headroom, so a gain of zero yields an all-zero payload
/// and full gain passes in-range samples through unchanged.
pub fn mix_samples(samples: &[f32], volume: f32) -> Vec<u8> {
    let mut mixed = vec![0.0f32; samples.len()];

    let gain = clamp_volume(volume);
    if gain > 0.0 {
        for (dst, &src) in mixed.iter_mut().zip(samples) {
            let value = *dst + src * gain;
            *dst = if value.is_nan() {
                0.0
            } else {
                value.clamp(-1.0, 1.0)
            };
        }
    }

    let mut payload = Vec::with_capacity(mixed.len() * 4);
    for sample in mixed {
        payload.extend_from_slice(&sample.to_ne_bytes());
    }
    payload
}

/// Decode a mixed payload back into samples
pub fn samples_from_payload(payload: &[u8]) -> impl Iterator<Item = f32> + '_ {
    payload
        .chunks_exact(4)
        .map(|bytes| f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
