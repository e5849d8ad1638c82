//! Discount and default curves.

mod credit;
mod flat;
mod traits;

pub use credit::{CreditCurve, FlatHazardRateCurve};
pub use flat::FlatCurve;
pub use traits::YieldCurve;
