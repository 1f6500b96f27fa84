//! Utility functions shared across the service.
//!
//! - [`conversion`] - Numeric conversions (U256 ratios, JSON numbers)

mod conversion;

pub use conversion::{json_to_f64, ratio_to_f64};
