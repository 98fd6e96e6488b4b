//! Pull-based backend contract consumed by the producer.

use std::path::PathBuf;

use crate::core::time::Seconds;

/// Error type for decoding operations
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("FFmpeg error: {0}")]
    FFmpeg(#[from] ffmpeg_next::Error),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("No video stream found")]
    NoVideoStream,
    #[error("No audio stream found")]
    NoAudioStream,
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DecodeError {
    /// Numeric code for hosts that poll errors as integers. FFmpeg errors keep
    /// their AVERROR value.
    pub fn code(&self) -> i32 {
        match self {
            DecodeError::FFmpeg(err) => i32::from(*err),
            _ => -1,
        }
    }
}

/// One decoded unit, already converted to the sinks' formats
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedUnit {
    /// BGRA pixels at the pixel sink's size, top row first
    Video { pixels: Vec<u8>, timestamp: Seconds },
    /// Interleaved f32 samples in the audio sink's layout
    Audio { samples: Vec<f32>, timestamp: Seconds },
}

impl DecodedUnit {
    pub fn timestamp(&self) -> Seconds {
        match self {
            DecodedUnit::Video { timestamp, .. } | DecodedUnit::Audio { timestamp, .. } => {
                *timestamp
            }
        }
    }
}

/// Demuxer plus decoders for exactly one video and one audio stream.
///
/// `Ok(None)` means clean end of stream and is distinct from `Err`. Calls may
/// block for as long as the backend needs; there is no timeout.
pub trait MediaSource: Send {
    fn next_unit(&mut self) -> Result<Option<DecodedUnit>, DecodeError>;
}
