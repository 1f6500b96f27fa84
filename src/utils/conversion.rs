//! Numeric conversion utilities.
//!
//! Oracle rates arrive as 256-bit fixed-point numerator/denominator pairs.
//! They are divided as big decimals before narrowing to `f64` so that large
//! fixidity values keep their precision.

use alloy::primitives::U256;
use bigdecimal::BigDecimal;
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

/// Convert U256 to an arbitrary precision decimal.
fn u256_to_bigdecimal(value: U256) -> BigDecimal {
    let bytes: [u8; 32] = value.to_le_bytes();
    BigDecimal::from(BigInt::from_bytes_le(Sign::Plus, &bytes))
}

/// Divide two U256 values as decimals.
///
/// Returns `None` for a zero denominator or a quotient that does not fit a
/// finite `f64`.
pub fn ratio_to_f64(numerator: U256, denominator: U256) -> Option<f64> {
    if denominator.is_zero() {
        return None;
    }

    let quotient = u256_to_bigdecimal(numerator) / u256_to_bigdecimal(denominator);
    let result = quotient.to_f64()?;

    if result.is_finite() {
        Some(result)
    } else {
        None
    }
}

/// Parse a JSON number or numeric string into a finite `f64`.
pub fn json_to_f64(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    parsed.is_finite().then_some(parsed)
}
