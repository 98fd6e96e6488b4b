pub mod engine;
pub mod history;
pub mod renderer;
pub mod state;
pub mod sync;

pub use engine::{ErrorCode, PlaybackStatus, Player, PlayerError};
pub use history::{HistoryBuffer, HistoryUnit};
pub use renderer::{RenderExit, Renderer};
pub use state::{LastError, Lifecycle, Phase, SharedState, StatsSnapshot};
pub use sync::SyncClock;
