//! Ahead-of-time decoding video player.
//!
//! A producer thread decodes a media file into two timestamped history
//! buffers; a render thread paces the buffered units against the wall clock
//! and hands them to a pixel sink and an audio sink. [`Player`] owns both
//! threads.

pub mod audio;
pub mod core;
pub mod decode;
pub mod media;
pub mod playback;
pub mod render;
pub mod ui;

pub use playback::{ErrorCode, Phase, PlaybackStatus, Player, PlayerError};
