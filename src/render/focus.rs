//! Foreground-focus signal for the window that shows the video.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Answers whether the video's target window currently has focus
pub trait FocusProbe: Send + Sync {
    fn is_focused(&self) -> bool;
}

/// Probe for hosts without a window concept
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFocused;

impl FocusProbe for AlwaysFocused {
    fn is_focused(&self) -> bool {
        true
    }
}

/// Focus flag written by the host's UI thread and read by the render worker
#[derive(Debug, Clone)]
pub struct SharedFocus {
    focused: Arc<AtomicBool>,
}

impl Default for SharedFocus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SharedFocus {
    pub fn new(focused: bool) -> Self {
        Self {
            focused: Arc::new(AtomicBool::new(focused)),
        }
    }

    pub fn set(&self, focused: bool) {
        self.focused.store(focused, Ordering::Relaxed);
    }
}

impl FocusProbe for SharedFocus {
    fn is_focused(&self) -> bool {
        self.focused.load(Ordering::Relaxed)
    }
}
