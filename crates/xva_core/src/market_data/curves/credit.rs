//! Credit curve abstractions for default probability lookups.
//!
//! This module provides:
//! - [`CreditCurve`]: Generic trait for hazard rate and survival probability calculations
//! - [`FlatHazardRateCurve`]: Constant hazard rate curve

use crate::market_data::error::MarketDataError;
use num_traits::Float;

/// Default-probability term structure queried by year fraction.
pub trait CreditCurve<T: Float> {
    /// Instantaneous hazard rate λ(t).
    fn hazard_rate(&self, t: T) -> Result<T, MarketDataError>;

    /// Survival probability Q(τ > t).
    fn survival_probability(&self, t: T) -> Result<T, MarketDataError>;

    /// Cumulative default probability 1 - Q(τ > t).
    fn default_probability(&self, t: T) -> Result<T, MarketDataError> {
        Ok(T::one() - self.survival_probability(t)?)
    }

    /// Probability of default in (t1, t2], Q(τ > t1) - Q(τ > t2).
    fn default_probability_between(&self, t1: T, t2: T) -> Result<T, MarketDataError> {
        if t2 < t1 {
            return Err(MarketDataError::InvalidMaturity {
                t: (t2 - t1).to_f64().unwrap_or(0.0),
            });
        }
        Ok(self.survival_probability(t1)? - self.survival_probability(t2)?)
    }
}

/// Flat hazard rate credit curve: Q(τ > t) = exp(-λ t).
///
/// # Examples
/// ```
/// use xva_core::market_data::curves::{CreditCurve, FlatHazardRateCurve};
///
/// let curve = FlatHazardRateCurve::new(0.01_f64).unwrap();
/// let q = curve.survival_probability(1.0).unwrap();
/// assert!((q - (-0.01_f64).exp()).abs() < 1e-15);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatHazardRateCurve<T: Float> {
    hazard_rate: T,
}

impl<T: Float> FlatHazardRateCurve<T> {
    /// Create a flat hazard rate curve.
    ///
    /// # Errors
    ///
    /// Returns `MarketDataError::InvalidRate` for a negative hazard rate.
    pub fn new(hazard_rate: T) -> Result<Self, MarketDataError> {
        if hazard_rate < T::zero() {
            return Err(MarketDataError::InvalidRate {
                name: "hazard_rate",
                value: hazard_rate.to_f64().unwrap_or(0.0),
            });
        }
        Ok(Self { hazard_rate })
    }

    /// Hazard rate implied by a one-year default probability,
    /// λ = -ln(1 - pd).
    pub fn from_one_year_default_probability(pd: T) -> Result<Self, MarketDataError> {
        if pd < T::zero() || pd >= T::one() {
            return Err(MarketDataError::InvalidProbability {
                name: "pd",
                value: pd.to_f64().unwrap_or(0.0),
            });
        }
        Self::new(-(T::one() - pd).ln())
    }

    /// The constant hazard rate.
    #[inline]
    pub fn rate(&self) -> T {
        self.hazard_rate
    }
}

impl<T: Float> CreditCurve<T> for FlatHazardRateCurve<T> {
    fn hazard_rate(&self, t: T) -> Result<T, MarketDataError> {
        if t < T::zero() {
            return Err(MarketDataError::InvalidMaturity {
                t: t.to_f64().unwrap_or(0.0),
            });
        }
        Ok(self.hazard_rate)
    }

    fn survival_probability(&self, t: T) -> Result<T, MarketDataError> {
        if t < T::zero() {
            return Err(MarketDataError::InvalidMaturity {
                t: t.to_f64().unwrap_or(0.0),
            });
        }
        Ok((-self.hazard_rate * t).exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_negative_hazard_rejected() {
        assert!(FlatHazardRateCurve::new(-0.01_f64).is_err());
    }

    #[test]
    fn test_default_probability() {
        let curve = FlatHazardRateCurve::new(0.02_f64).unwrap();
        assert_relative_eq!(
            curve.default_probability(2.0).unwrap(),
            1.0 - (-0.04_f64).exp(),
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_from_one_year_default_probability() {
        let curve = FlatHazardRateCurve::from_one_year_default_probability(0.05_f64).unwrap();
        assert_relative_eq!(curve.default_probability(1.0).unwrap(), 0.05, epsilon = 1e-14);
        assert!(FlatHazardRateCurve::from_one_year_default_probability(1.0_f64).is_err());
    }

    #[test]
    fn test_default_probability_between() {
        let curve = FlatHazardRateCurve::new(0.03_f64).unwrap();
        let marginal = curve.default_probability_between(1.0, 2.0).unwrap();
        let total = curve.default_probability(2.0).unwrap() - curve.default_probability(1.0).unwrap();
        assert_relative_eq!(marginal, total, epsilon = 1e-15);
        assert!(curve.default_probability_between(2.0, 1.0).is_err());
    }
}
