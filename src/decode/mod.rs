pub mod producer;
pub mod source;
pub mod stream_info;

pub use producer::{Producer, ProducerExit};
pub use source::{DecodeError, DecodedUnit, MediaSource};
pub use stream_info::{AudioStreamInfo, MediaInfo, StreamInfo, VideoStreamInfo};
