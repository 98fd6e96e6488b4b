//! egui host window for the player.

pub mod app;

pub use app::{LaunchOptions, PlayerApp};
