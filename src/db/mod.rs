use async_trait::async_trait;

use crate::error::StorageError;

pub mod models;
pub mod postgres;

pub use models::{HistoryQuery, PriceRecord, SortOrder, TvlSnapshot};
pub use postgres::PostgresClient;

/// Append-only price history.
///
/// Implementations never update or delete a stored record. Concurrent
/// appends are independent rows and need no coordination.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Insert a new history row.
    async fn append(&self, record: &PriceRecord) -> Result<(), StorageError>;

    /// One page of `symbol`'s history, ordered by timestamp (ascending unless
    /// the query says otherwise). No data is an empty page, not an error.
    async fn query_history(
        &self,
        symbol: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<PriceRecord>, StorageError>;

    /// Most recent row by timestamp, or `None` when nothing is stored.
    async fn query_latest(&self, symbol: &str) -> Result<Option<PriceRecord>, StorageError>;

    /// Number of `symbol`'s rows inside the query's `from`/`to` window,
    /// ignoring pagination.
    async fn count(&self, symbol: &str, query: &HistoryQuery) -> Result<i64, StorageError>;
}
