//! Refresh poller for live mode.
//!
//! Two states: Idle (static mode) and Polling (live mode). While polling, a
//! background task runs one refresh cycle per interval: fetch every tracked
//! symbol, append it to the store, overwrite the cache and publish it.

mod controller;
mod live_mode;
#[allow(clippy::module_inception)]
mod poller;

pub use controller::ModeController;
pub use live_mode::LiveModeFlag;
pub use poller::{CycleReport, Poller};
