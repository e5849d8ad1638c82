//! Funding and margin valuation adjustments.
//!
//! # Formulas
//!
//! FCA = Σⱼ EPE(tⱼ) × s_borrow × Δtⱼ × S_c(tⱼ₋₁) × S_b(tⱼ₋₁)
//! FBA = Σⱼ ENE(tⱼ) × s_lend × Δtⱼ × S_c(tⱼ₋₁) × S_b(tⱼ₋₁)
//! MVA = Σⱼ E[IM](tⱼ) × s_borrow × Δtⱼ × S_c(tⱼ₋₁) × S_b(tⱼ₋₁)
//!
//! Where:
//! - S_c, S_b = counterparty and own survival probabilities
//! - Δtⱼ = year fraction between consecutive dates, the first from today

use crate::error::AggregationError;

fn check_len(what: &str, expected: usize, actual: usize) -> Result<(), AggregationError> {
    if actual == expected {
        Ok(())
    } else {
        Err(AggregationError::DimensionMismatch {
            what: what.to_string(),
            expected,
            actual,
        })
    }
}

/// Spread-weighted funding sum shared by FCA, FBA and MVA.
///
/// # Arguments
///
/// * `amount` - Funded amount per simulation date
/// * `accruals` - Year fraction of each period
/// * `counterparty_survival` - Counterparty survival, today first
/// * `own_survival` - Own survival, today first
/// * `spread` - Funding spread (annualised decimal)
///
/// # Errors
///
/// [`AggregationError::DimensionMismatch`] unless `accruals` has one entry
/// per date and both survival vectors have one more.
pub fn compute_funding_cost(
    amount: &[f64],
    accruals: &[f64],
    counterparty_survival: &[f64],
    own_survival: &[f64],
    spread: f64,
) -> Result<f64, AggregationError> {
    let n = amount.len();
    check_len("accrual periods", n, accruals.len())?;
    check_len("counterparty survival probabilities", n + 1, counterparty_survival.len())?;
    check_len("own survival probabilities", n + 1, own_survival.len())?;
    Ok((0..n)
        .map(|j| amount[j] * spread * accruals[j] * counterparty_survival[j] * own_survival[j])
        .sum())
}

/// Computes Funding Cost Adjustment on positive exposure.
///
/// # Examples
///
/// ```
/// use xva_aggregation::xva::compute_fca;
///
/// let epe = vec![100.0, 100.0];
/// let accruals = vec![0.5, 0.5];
/// let survival = vec![1.0, 1.0, 1.0];
/// let fca = compute_fca(&epe, &accruals, &survival, &survival, 0.01).unwrap();
/// assert!((fca - 1.0).abs() < 1e-12);
/// ```
pub fn compute_fca(
    epe: &[f64],
    accruals: &[f64],
    counterparty_survival: &[f64],
    own_survival: &[f64],
    borrowing_spread: f64,
) -> Result<f64, AggregationError> {
    compute_funding_cost(epe, accruals, counterparty_survival, own_survival, borrowing_spread)
}

/// Computes Funding Benefit Adjustment on negative exposure.
pub fn compute_fba(
    ene: &[f64],
    accruals: &[f64],
    counterparty_survival: &[f64],
    own_survival: &[f64],
    lending_spread: f64,
) -> Result<f64, AggregationError> {
    compute_funding_cost(ene, accruals, counterparty_survival, own_survival, lending_spread)
}

/// Computes Margin Valuation Adjustment on expected initial margin.
pub fn compute_mva(
    expected_im: &[f64],
    accruals: &[f64],
    counterparty_survival: &[f64],
    own_survival: &[f64],
    borrowing_spread: f64,
) -> Result<f64, AggregationError> {
    compute_funding_cost(expected_im, accruals, counterparty_survival, own_survival, borrowing_spread)
}
