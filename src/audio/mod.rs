pub mod mixer;
pub mod player;
pub mod sink;

pub use mixer::{gain_from_host_level, mix_samples, VolumeControl};
pub use player::{AudioError, CpalAudioSink, CpalOutput};
pub use sink::{AudioSink, AudioSpec};
