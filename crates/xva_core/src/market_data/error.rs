//! Market data error types.

use thiserror::Error;

/// Errors raised by curve construction and lookups.
///
/// # Examples
/// ```
/// use xva_core::market_data::MarketDataError;
///
/// let err = MarketDataError::InvalidMaturity { t: -1.5 };
/// assert_eq!(format!("{}", err), "Invalid maturity: t = -1.5");
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    /// Negative or otherwise unusable time argument.
    #[error("Invalid maturity: t = {t}")]
    InvalidMaturity {
        /// Offending year fraction
        t: f64,
    },

    /// Rate parameter that cannot build a curve (e.g. negative hazard rate).
    #[error("Invalid rate: {name} = {value}")]
    InvalidRate {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// Probability outside [0, 1].
    #[error("Invalid probability: {name} = {value}")]
    InvalidProbability {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rate_display() {
        let err = MarketDataError::InvalidRate {
            name: "hazard_rate",
            value: -0.01,
        };
        assert_eq!(format!("{}", err), "Invalid rate: hazard_rate = -0.01");
    }

    #[test]
    fn test_invalid_probability_display() {
        let err = MarketDataError::InvalidProbability {
            name: "recovery",
            value: 1.5,
        };
        assert!(err.to_string().contains("recovery"));
    }

    #[test]
    fn test_error_trait_implementation() {
        let err = MarketDataError::InvalidMaturity { t: -1.0 };
        let _: &dyn std::error::Error = &err;
    }
}
