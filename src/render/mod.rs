//! Video output side: the pixel sink contract and the focus signal.

pub mod focus;
pub mod sink;

pub use focus::{AlwaysFocused, FocusProbe, SharedFocus};
pub use sink::{FrameBuffer, FrameBufferSink, PixelSink, SinkError, BYTES_PER_PIXEL};
