//! Market access for post-processing.
//!
//! The aggregation engine only needs discount curves, default curves with
//! recovery rates and index conventions. [`SimpleMarket`] is an in-memory
//! implementation with flat curves.

use std::collections::HashMap;

use xva_core::market_data::curves::{CreditCurve, FlatCurve, FlatHazardRateCurve, YieldCurve};
use xva_core::types::{Date, DayCountConvention};

use crate::error::AggregationError;

/// Market view as of the valuation date.
pub trait Market: Send + Sync {
    /// Valuation date.
    fn asof(&self) -> Date;

    /// Discount curve of a currency.
    fn discount_curve(&self, currency: &str) -> Option<&dyn YieldCurve<f64>>;

    /// Default curve of a credit name.
    fn default_curve(&self, name: &str) -> Option<&dyn CreditCurve<f64>>;

    /// Recovery rate of a credit name.
    fn recovery_rate(&self, name: &str) -> Option<f64>;

    /// Day counter of an overnight index. Defaults to Actual/Actual (ISDA).
    fn index_day_counter(&self, _index: &str) -> DayCountConvention {
        DayCountConvention::ActualActualIsda
    }
}

/// Discount factor from the valuation date to `date` on the curve of `currency`.
///
/// Year fractions are Actual/Actual (ISDA).
pub fn discount_factor(
    market: &dyn Market,
    currency: &str,
    date: Date,
) -> Result<f64, AggregationError> {
    let curve = market
        .discount_curve(currency)
        .ok_or_else(|| AggregationError::MissingDiscountCurve(currency.to_string()))?;
    let t = DayCountConvention::ActualActualIsda.year_fraction(market.asof(), date);
    Ok(curve.discount_factor(t)?)
}

/// Discount factors for each date of a grid.
pub fn discount_factors(
    market: &dyn Market,
    currency: &str,
    dates: &[Date],
) -> Result<Vec<f64>, AggregationError> {
    dates
        .iter()
        .map(|&d| discount_factor(market, currency, d))
        .collect()
}

/// In-memory market with flat curves.
///
/// # Examples
///
/// ```
/// use xva_aggregation::market::{discount_factor, Market, SimpleMarket};
/// use xva_core::types::Date;
///
/// let today = Date::from_ymd(2024, 1, 1).unwrap();
/// let market = SimpleMarket::new(today, "EUR")
///     .with_discount_rate("EUR", 0.02)
///     .with_hazard_rate("CPTY_A", 0.01, 0.4)
///     .unwrap();
///
/// let df = discount_factor(&market, "EUR", Date::from_ymd(2025, 1, 1).unwrap()).unwrap();
/// assert!((df - (-0.02_f64).exp()).abs() < 1e-14);
/// assert_eq!(market.recovery_rate("CPTY_A"), Some(0.4));
/// ```
pub struct SimpleMarket {
    asof: Date,
    base_currency: String,
    discount_curves: HashMap<String, Box<dyn YieldCurve<f64> + Send + Sync>>,
    default_curves: HashMap<String, Box<dyn CreditCurve<f64> + Send + Sync>>,
    recovery_rates: HashMap<String, f64>,
    index_day_counters: HashMap<String, DayCountConvention>,
}

impl SimpleMarket {
    /// Creates an empty market.
    pub fn new(asof: Date, base_currency: impl Into<String>) -> Self {
        Self {
            asof,
            base_currency: base_currency.into(),
            discount_curves: HashMap::new(),
            default_curves: HashMap::new(),
            recovery_rates: HashMap::new(),
            index_day_counters: HashMap::new(),
        }
    }

    /// Base currency the market was created with.
    #[inline]
    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    /// Adds a flat discount curve.
    pub fn with_discount_rate(self, currency: impl Into<String>, rate: f64) -> Self {
        self.with_discount_curve(currency, FlatCurve::new(rate))
    }

    /// Adds a discount curve.
    pub fn with_discount_curve(
        mut self,
        currency: impl Into<String>,
        curve: impl YieldCurve<f64> + Send + Sync + 'static,
    ) -> Self {
        self.discount_curves.insert(currency.into(), Box::new(curve));
        self
    }

    /// Adds a flat hazard rate curve and recovery rate.
    ///
    /// # Errors
    ///
    /// Fails for a negative hazard rate or a recovery outside [0, 1].
    pub fn with_hazard_rate(
        self,
        name: impl Into<String>,
        hazard_rate: f64,
        recovery: f64,
    ) -> Result<Self, AggregationError> {
        let curve = FlatHazardRateCurve::new(hazard_rate)?;
        self.with_default_curve(name, curve, recovery)
    }

    /// Adds a default curve and recovery rate.
    pub fn with_default_curve(
        mut self,
        name: impl Into<String>,
        curve: impl CreditCurve<f64> + Send + Sync + 'static,
        recovery: f64,
    ) -> Result<Self, AggregationError> {
        if !(0.0..=1.0).contains(&recovery) {
            return Err(AggregationError::invalid_parameter(format!(
                "recovery rate {} outside [0, 1]",
                recovery
            )));
        }
        let name = name.into();
        self.recovery_rates.insert(name.clone(), recovery);
        self.default_curves.insert(name, Box::new(curve));
        Ok(self)
    }

    /// Sets the day counter of an overnight index.
    pub fn with_index_day_counter(
        mut self,
        index: impl Into<String>,
        day_counter: DayCountConvention,
    ) -> Self {
        self.index_day_counters.insert(index.into(), day_counter);
        self
    }
}

impl Market for SimpleMarket {
    fn asof(&self) -> Date {
        self.asof
    }

    fn discount_curve(&self, currency: &str) -> Option<&dyn YieldCurve<f64>> {
        self.discount_curves
            .get(currency)
            .map(|c| c.as_ref() as &dyn YieldCurve<f64>)
    }

    fn default_curve(&self, name: &str) -> Option<&dyn CreditCurve<f64>> {
        self.default_curves
            .get(name)
            .map(|c| c.as_ref() as &dyn CreditCurve<f64>)
    }

    fn recovery_rate(&self, name: &str) -> Option<f64> {
        self.recovery_rates.get(name).copied()
    }

    fn index_day_counter(&self, index: &str) -> DayCountConvention {
        self.index_day_counters
            .get(index)
            .copied()
            .unwrap_or_default()
    }
}
