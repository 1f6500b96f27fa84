mod history_query;
mod price_record;
mod tvl_snapshot;

pub use history_query::{HistoryQuery, SortOrder, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
pub use price_record::PriceRecord;
pub use tvl_snapshot::TvlSnapshot;
