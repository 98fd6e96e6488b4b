//! Core types shared by every stage of the pipeline.
//!
//! Timestamps are seconds (f64) and playback tunables live in
//! [`PlaybackSettings`].

pub mod config;
pub mod time;

pub use config::PlaybackSettings;
pub use time::{Seconds, ZERO};
