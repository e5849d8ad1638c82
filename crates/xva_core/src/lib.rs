//! # xva_core: Foundation Layer for Exposure Aggregation
//!
//! ## Layer 1 (Foundation) Role
//!
//! xva_core is the bottom layer of the workspace, providing:
//! - Time types: `Date`, `DayCountConvention`, weekends-only calendar adjustment (`types::time`)
//! - Error types: `DateError` (`types::error`), `MarketDataError` (`market_data::error`)
//! - Curve abstractions: `YieldCurve`, `CreditCurve` and flat implementations (`market_data::curves`)
//! - Standard normal distribution: `norm_cdf`, `norm_inv_cdf` (`math::distributions`)
//!
//! ## Minimal Dependencies
//!
//! Layer 1 has no dependencies on other workspace crates:
//! - num-traits: Traits for generic numerical computation
//! - chrono: Date arithmetic
//! - thiserror: Error derivation
//! - serde: Serialisation support (optional)
//!
//! ## Usage Examples
//!
//! ```rust
//! use xva_core::types::{Date, DayCountConvention};
//! use xva_core::market_data::curves::{CreditCurve, FlatHazardRateCurve};
//!
//! let today = Date::from_ymd(2024, 1, 1).unwrap();
//! let one_year = today.add_years(1).unwrap();
//! let t = DayCountConvention::ActualActualIsda.year_fraction(today, one_year);
//! assert!((t - 1.0).abs() < 1e-12);
//!
//! let curve = FlatHazardRateCurve::new(0.02_f64).unwrap();
//! let pd = curve.default_probability(t).unwrap();
//! assert!(pd > 0.0 && pd < 0.02);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod market_data;
pub mod math;
pub mod types;
