//! Yield curve trait definition.

use crate::market_data::error::MarketDataError;
use num_traits::Float;

/// Discounting curve queried by year fraction from the valuation date.
pub trait YieldCurve<T: Float> {
    /// Discount factor P(0, t).
    ///
    /// # Errors
    ///
    /// Returns `MarketDataError::InvalidMaturity` for negative `t`.
    fn discount_factor(&self, t: T) -> Result<T, MarketDataError>;

    /// Continuously compounded zero rate to `t`.
    fn zero_rate(&self, t: T) -> Result<T, MarketDataError> {
        let df = self.discount_factor(t)?;
        if t <= T::zero() {
            return Err(MarketDataError::InvalidMaturity {
                t: t.to_f64().unwrap_or(0.0),
            });
        }
        Ok(-df.ln() / t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockCurve {
        rate: f64,
    }

    impl YieldCurve<f64> for MockCurve {
        fn discount_factor(&self, t: f64) -> Result<f64, MarketDataError> {
            if t < 0.0 {
                return Err(MarketDataError::InvalidMaturity { t });
            }
            Ok((-self.rate * t).exp())
        }
    }

    #[test]
    fn test_default_zero_rate() {
        let curve = MockCurve { rate: 0.05 };
        let r = curve.zero_rate(2.0).unwrap();
        assert!((r - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_default_zero_rate_invalid_maturity() {
        let curve = MockCurve { rate: 0.05 };
        assert_eq!(
            curve.zero_rate(0.0),
            Err(MarketDataError::InvalidMaturity { t: 0.0 })
        );
    }
}
