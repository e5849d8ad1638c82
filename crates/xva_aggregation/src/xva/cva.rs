//! Credit and debit valuation adjustment.
//!
//! # Formula
//!
//! CVA = LGD × Σⱼ EPE(tⱼ) × (S(tⱼ₋₁) − S(tⱼ))
//!
//! Where:
//! - LGD = 1 − recovery
//! - EPE(tⱼ) = expected positive exposure at simulation date j
//! - S(t) = survival probability, t₋₁ = today
//!
//! DVA is the same sum over ENE with our own curve.

use crate::error::AggregationError;

/// Computes CVA (or DVA) from an exposure profile.
///
/// # Arguments
///
/// * `exposure` - Expected exposure per simulation date
/// * `survival` - Survival probabilities, today first (one longer than `exposure`)
/// * `lgd` - Loss given default
///
/// # Errors
///
/// [`AggregationError::DimensionMismatch`] when `survival` is not one longer
/// than `exposure`.
///
/// # Examples
///
/// ```
/// use xva_aggregation::xva::compute_cva;
///
/// let epe = vec![100.0, 50.0];
/// let survival = vec![1.0, 0.99, 0.97];
/// let cva = compute_cva(&epe, &survival, 0.6).unwrap();
/// assert!((cva - 0.6 * (100.0 * 0.01 + 50.0 * 0.02)).abs() < 1e-12);
/// ```
pub fn compute_cva(exposure: &[f64], survival: &[f64], lgd: f64) -> Result<f64, AggregationError> {
    if survival.len() != exposure.len() + 1 {
        return Err(AggregationError::DimensionMismatch {
            what: "survival probabilities".to_string(),
            expected: exposure.len() + 1,
            actual: survival.len(),
        });
    }
    Ok(exposure
        .iter()
        .zip(survival.windows(2))
        .map(|(e, s)| e * (s[0] - s[1]))
        .sum::<f64>()
        * lgd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_exposure() {
        assert_eq!(compute_cva(&[0.0, 0.0], &[1.0, 0.9, 0.8], 0.6).unwrap(), 0.0);
    }

    #[test]
    fn test_no_default_risk() {
        assert_eq!(compute_cva(&[10.0, 10.0], &[1.0, 1.0, 1.0], 0.6).unwrap(), 0.0);
    }

    #[test]
    fn test_mismatched_lengths() {
        let result = compute_cva(&[10.0], &[1.0], 0.6);
        assert!(matches!(
            result,
            Err(AggregationError::DimensionMismatch { expected: 2, actual: 1, .. })
        ));
        // Survival without today in front.
        assert!(compute_cva(&[10.0, 5.0], &[0.99, 0.97], 0.6).is_err());
    }

    #[test]
    fn test_linear_in_lgd() {
        let e = [5.0, 7.0, 3.0];
        let s = [1.0, 0.98, 0.95, 0.9];
        assert_relative_eq!(
            compute_cva(&e, &s, 0.8).unwrap(),
            2.0 * compute_cva(&e, &s, 0.4).unwrap(),
            epsilon = 1e-14
        );
    }
}
