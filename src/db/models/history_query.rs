use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Largest page a single history query may return.
pub const MAX_HISTORY_LIMIT: i64 = 1_000;

pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Page of a symbol's price history.
///
/// Re-issuing the same query returns the same rows, so a caller can walk the
/// full history page by page and restart at any offset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub order: SortOrder,
}

fn default_limit() -> i64 {
    DEFAULT_HISTORY_LIMIT
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            limit: DEFAULT_HISTORY_LIMIT,
            offset: 0,
            order: SortOrder::Asc,
        }
    }
}

impl HistoryQuery {
    /// Clamp pagination into the supported range.
    pub fn sanitized(&self) -> Self {
        Self {
            limit: self.limit.clamp(1, MAX_HISTORY_LIMIT),
            offset: self.offset.max(0),
            ..self.clone()
        }
    }

    /// Whether a timestamp falls inside the optional `[from, to]` window.
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| *timestamp >= from)
            && self.to.map_or(true, |to| *timestamp <= to)
    }
}
