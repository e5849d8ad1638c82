//! Market data abstractions consumed by the aggregation layer.
//!
//! Curves are queried by year fraction from the valuation date; callers
//! convert calendar dates with a [`DayCountConvention`](crate::types::DayCountConvention).

pub mod curves;
pub mod error;

pub use curves::{CreditCurve, FlatCurve, FlatHazardRateCurve, YieldCurve};
pub use error::MarketDataError;
