//! Stream metadata extracted when a container is opened.

use crate::core::time::Seconds;

/// Information about a video or audio stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub index: usize,
    pub codec_name: String,
    /// Rational time base (num, den) of the stream's timestamps
    pub time_base: (i32, i32),
}

/// Video-specific stream information
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub stream_info: StreamInfo,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Audio-specific stream information
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamInfo {
    pub stream_info: StreamInfo,
    pub sample_rate: u32,
    pub channels: u16,
}

/// The two streams the pipeline plays
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub video: VideoStreamInfo,
    pub audio: AudioStreamInfo,
    /// Container duration, when the container reports one
    pub duration: Option<Seconds>,
}
