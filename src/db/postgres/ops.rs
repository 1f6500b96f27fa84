use async_trait::async_trait;
use log::error;
use tokio_postgres::Row;

use crate::db::models::{HistoryQuery, PriceRecord, SortOrder};
use crate::db::postgres::PostgresClient;
use crate::db::PriceStore;
use crate::error::StorageError;

/// Build the history page query. Only the sort direction is interpolated;
/// everything caller-supplied is bound as a parameter.
fn history_sql(order: SortOrder) -> String {
    format!(
        r#"
        SELECT symbol, price, timestamp
        FROM prices
        WHERE symbol = $1
          AND ($2::timestamptz IS NULL OR timestamp >= $2)
          AND ($3::timestamptz IS NULL OR timestamp <= $3)
        ORDER BY timestamp {dir}, id {dir}
        LIMIT $4 OFFSET $5
        "#,
        dir = order.as_sql()
    )
}

const COUNT_SQL: &str = r#"
    SELECT COUNT(*) AS n
    FROM prices
    WHERE symbol = $1
      AND ($2::timestamptz IS NULL OR timestamp >= $2)
      AND ($3::timestamptz IS NULL OR timestamp <= $3)
"#;

fn row_to_price(row: &Row) -> PriceRecord {
    PriceRecord {
        symbol: row.get("symbol"),
        price: row.get("price"),
        timestamp: row.get("timestamp"),
    }
}

impl PostgresClient {
    // ==================== PRICES ====================

    /// Insert one price row
    pub async fn insert_price(&self, record: &PriceRecord) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO prices (symbol, price, timestamp)
            VALUES ($1, $2, $3)
        "#;

        client
            .execute(query, &[&record.symbol, &record.price, &record.timestamp])
            .await
            .map_err(|e| {
                error!("Failed to insert price for {}: {:?}", record.symbol, e);
                e
            })?;

        Ok(())
    }

    /// Get one page of a symbol's price history
    pub async fn get_price_history(
        &self,
        symbol: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<PriceRecord>, StorageError> {
        let query = query.sanitized();
        let client = self.pool.get().await?;

        let rows = client
            .query(
                history_sql(query.order).as_str(),
                &[
                    &symbol,
                    &query.from,
                    &query.to,
                    &query.limit,
                    &query.offset,
                ],
            )
            .await?;

        Ok(rows.iter().map(row_to_price).collect())
    }

    /// Get the most recent price row for a symbol
    pub async fn get_latest_price(&self, symbol: &str) -> Result<Option<PriceRecord>, StorageError> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT symbol, price, timestamp
            FROM prices
            WHERE symbol = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
        "#;

        let row = client.query_opt(query, &[&symbol]).await?;
        Ok(row.as_ref().map(row_to_price))
    }

    /// Number of rows for a symbol inside the query's time window
    pub async fn count_prices(
        &self,
        symbol: &str,
        query: &HistoryQuery,
    ) -> Result<i64, StorageError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(COUNT_SQL, &[&symbol, &query.from, &query.to])
            .await?;
        Ok(row.get("n"))
    }
}

#[async_trait]
impl PriceStore for PostgresClient {
    async fn append(&self, record: &PriceRecord) -> Result<(), StorageError> {
        self.insert_price(record).await
    }

    async fn query_history(
        &self,
        symbol: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<PriceRecord>, StorageError> {
        self.get_price_history(symbol, query).await
    }

    async fn query_latest(&self, symbol: &str) -> Result<Option<PriceRecord>, StorageError> {
        self.get_latest_price(symbol).await
    }

    async fn count(&self, symbol: &str, query: &HistoryQuery) -> Result<i64, StorageError> {
        self.count_prices(symbol, query).await
    }
}
