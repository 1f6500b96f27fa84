use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide live/static switch.
///
/// Starts off. Only [`ModeController`](super::ModeController) flips it, so the
/// flag and the running poller never disagree for longer than one toggle.
#[derive(Debug, Default)]
pub struct LiveModeFlag(AtomicBool);

impl LiveModeFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(super) fn set(&self, live: bool) {
        self.0.store(live, Ordering::Release);
    }
}
