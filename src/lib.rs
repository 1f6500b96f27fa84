pub mod abis;
pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod poller;
pub mod service;
pub mod upstream;
pub mod utils;

#[cfg(test)]
mod testing;

pub use cache::LatestCache;
pub use config::Settings;
pub use db::{PostgresClient, PriceStore};
pub use error::{FetchError, ServiceError, StorageError};
pub use poller::{ModeController, Poller};
pub use service::{FetchRetry, PriceService};
pub use upstream::{PriceSource, SymbolRegistry, UpstreamClient};
