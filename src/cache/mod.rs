//! Latest-value cache with push notifications.
//!
//! Keeps the most recent price per symbol in memory and fans every update out
//! to live subscribers (the WebSocket push channel).

mod latest;

pub use latest::{LatestCache, DEFAULT_BROADCAST_CAPACITY};
