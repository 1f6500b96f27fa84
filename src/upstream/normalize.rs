//! Normalization of provider payloads into the common record shapes.
//!
//! Providers disagree on field names and on whether numbers arrive as JSON
//! numbers or strings. Each provider's native shape is tried first, then a
//! small set of common fallbacks. Errors are plain reasons; the caller tags
//! them with the provider name.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::ProviderKind;
use crate::db::TvlSnapshot;
use crate::utils::json_to_f64;

/// Keys that commonly carry a USD price in flat payloads.
const PRICE_KEYS: &[&str] = &["usd", "price", "price_usd", "priceUsd", "amount"];

const TVL_KEYS: &[&str] = &["tvl_usd", "tvl", "tvlUsd", "totalLiquidityUSD"];

const TVL_TIME_KEYS: &[&str] = &["last_updated", "lastUpdated", "timestamp", "date"];

fn first_number(object: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| object.get(*key).and_then(json_to_f64))
}

fn non_negative(value: f64, what: &str) -> Result<f64, String> {
    if value >= 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(format!("{} must be a non-negative number, got {}", what, value))
    }
}

/// Extract the USD price for `remote_id` from a provider response.
pub fn extract_price(provider: ProviderKind, remote_id: &str, body: &Value) -> Result<f64, String> {
    let native = match provider {
        // {"bitcoin": {"usd": 42000.53}}
        ProviderKind::Coingecko => body
            .get(remote_id)
            .and_then(|coin| coin.get("usd"))
            .and_then(json_to_f64),
        // {"data": {"amount": "42000.53", "base": "BTC", "currency": "USD"}}
        ProviderKind::Coinbase => body
            .get("data")
            .and_then(|data| data.get("amount"))
            .and_then(json_to_f64),
        ProviderKind::CeloOracle => None,
    };

    let price = native
        .or_else(|| first_number(body, PRICE_KEYS))
        .or_else(|| body.get("data").and_then(|data| first_number(data, PRICE_KEYS)))
        .or_else(|| json_to_f64(body))
        .ok_or_else(|| format!("no price for '{}' in response", remote_id))?;

    non_negative(price, "price")
}

/// Parse an RFC 3339 string or unix seconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                s.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            }),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

/// Build a TVL snapshot from an aggregator response.
///
/// Accepts a bare number (DeFiLlama `/tvl/{protocol}`), a numeric string, or
/// an object carrying the value and an optional update time. Values are
/// passed through untouched; `captured_at` is used only when the provider
/// gives no timestamp.
pub fn extract_tvl(
    protocol: &str,
    body: &Value,
    captured_at: DateTime<Utc>,
) -> Result<TvlSnapshot, String> {
    let (tvl, last_updated) = match body {
        Value::Object(_) => {
            let tvl = first_number(body, TVL_KEYS)
                .ok_or_else(|| format!("no TVL field for '{}' in response", protocol))?;
            let updated = TVL_TIME_KEYS
                .iter()
                .find_map(|key| body.get(*key).and_then(parse_timestamp));
            (tvl, updated)
        },
        other => {
            let tvl = json_to_f64(other)
                .ok_or_else(|| format!("unexpected TVL payload for '{}': {}", protocol, other))?;
            (tvl, None)
        },
    };

    Ok(TvlSnapshot::new(
        protocol,
        non_negative(tvl, "tvl")?,
        last_updated.unwrap_or(captured_at),
    ))
}
