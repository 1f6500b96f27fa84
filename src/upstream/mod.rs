//! Upstream price and TVL providers.
//!
//! [`UpstreamClient`] talks to CoinGecko, Coinbase and DeFiLlama over HTTP and
//! to Celo's SortedOracles over JSON-RPC, normalizing every response into a
//! [`PriceRecord`] or [`TvlSnapshot`].

use async_trait::async_trait;

use crate::db::{PriceRecord, TvlSnapshot};
use crate::error::FetchError;

mod celo;
mod client;
mod normalize;
mod registry;

pub use celo::CeloOracle;
pub use client::UpstreamClient;
pub use normalize::{extract_price, extract_tvl};
pub use registry::{normalize_protocol, SymbolRegistry, TrackedSymbol};

/// Source of current prices and protocol TVL.
///
/// One call is one bounded attempt with no side effects besides the outbound
/// request.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current price of a tracked symbol, stamped with the capture time.
    async fn fetch_price(&self, symbol: &str) -> Result<PriceRecord, FetchError>;

    async fn fetch_tvl(&self, protocol: &str) -> Result<TvlSnapshot, FetchError>;
}
