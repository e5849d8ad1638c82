//! Collateral balance paths.
//!
//! A [`CollateralPathProvider`] turns a netting set's simulated values into
//! a date × sample matrix of collateral balances, in base currency. A
//! positive balance is collateral held by us, a negative balance is
//! collateral posted.

use std::collections::HashMap;

use xva_core::types::Date;

use crate::config::CollateralCalculationType;
use crate::error::AggregationError;
use crate::portfolio::CollateralAgreement;

/// Collateral balance per (date index, sample).
#[derive(Debug, Clone, PartialEq)]
pub struct CollateralBalancePaths {
    balances: Vec<Vec<f64>>,
}

impl CollateralBalancePaths {
    /// Wraps a date × sample balance matrix.
    pub fn new(balances: Vec<Vec<f64>>) -> Self {
        Self { balances }
    }

    /// Balance at (date index, sample). Outside the grid the balance is 0.
    #[inline]
    pub fn balance(&self, date: usize, sample: usize) -> f64 {
        self.balances
            .get(date)
            .and_then(|row| row.get(sample))
            .copied()
            .unwrap_or(0.0)
    }

    /// Number of dates.
    #[inline]
    pub fn num_dates(&self) -> usize {
        self.balances.len()
    }

    /// Number of samples on the first date.
    #[inline]
    pub fn samples(&self) -> usize {
        self.balances.first().map_or(0, Vec::len)
    }

    fn check_grid(&self, netting_set: &str, dates: usize, samples: usize) -> Result<(), AggregationError> {
        if self.num_dates() != dates {
            return Err(AggregationError::DimensionMismatch {
                what: format!("collateral dates of {}", netting_set),
                expected: dates,
                actual: self.num_dates(),
            });
        }
        if let Some(row) = self.balances.iter().find(|row| row.len() != samples) {
            return Err(AggregationError::DimensionMismatch {
                what: format!("collateral samples of {}", netting_set),
                expected: samples,
                actual: row.len(),
            });
        }
        Ok(())
    }
}

/// Everything a collateral model sees for one netting set.
#[derive(Debug, Clone, Copy)]
pub struct CollateralInputs<'a> {
    /// Netting set id.
    pub netting_set: &'a str,
    /// Active collateral agreement.
    pub csa: &'a CollateralAgreement,
    /// Netting-set value today.
    pub npv_today: f64,
    /// Simulated netting-set values, date × sample, base currency.
    pub values: &'a [Vec<f64>],
    /// Valuation date.
    pub asof: Date,
    /// Simulation dates.
    pub dates: &'a [Date],
    /// Latest trade maturity in the netting set.
    pub maturity: Date,
    /// Margin lag convention.
    pub calculation_type: CollateralCalculationType,
    /// CSA currency to base currency FX rate, date × sample; `None` when the
    /// CSA is in base currency.
    pub fx_rates: Option<&'a [Vec<f64>]>,
    /// Compounding index fixings, date × sample.
    pub index_fixings: Option<&'a [Vec<f64>]>,
}

impl CollateralInputs<'_> {
    #[inline]
    fn fx(&self, date: usize, sample: usize) -> f64 {
        self.fx_rates
            .and_then(|m| m.get(date))
            .and_then(|row| row.get(sample))
            .copied()
            .unwrap_or(1.0)
    }

    #[inline]
    fn samples(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }
}

/// Source of collateral balance paths.
pub trait CollateralPathProvider: Send + Sync {
    /// Balance paths of an actively collateralised netting set, or `None`
    /// when the provider has none for it.
    fn balance_paths(
        &self,
        inputs: &CollateralInputs<'_>,
    ) -> Result<Option<CollateralBalancePaths>, AggregationError>;
}

/// Provider for uncollateralised portfolios.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCollateral;

impl CollateralPathProvider for NoCollateral {
    fn balance_paths(
        &self,
        _inputs: &CollateralInputs<'_>,
    ) -> Result<Option<CollateralBalancePaths>, AggregationError> {
        Ok(None)
    }
}

/// Precomputed balance paths keyed by netting set.
///
/// # Examples
///
/// ```
/// use xva_aggregation::collateral::{CollateralBalancePaths, StaticCollateralPaths};
///
/// let provider = StaticCollateralPaths::new()
///     .with_paths("NS1", CollateralBalancePaths::new(vec![vec![5.0, -1.0]]));
/// assert!(provider.contains("NS1"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCollateralPaths {
    paths: HashMap<String, CollateralBalancePaths>,
}

impl StaticCollateralPaths {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the paths of a netting set.
    pub fn with_paths(mut self, netting_set: impl Into<String>, paths: CollateralBalancePaths) -> Self {
        self.paths.insert(netting_set.into(), paths);
        self
    }

    /// True when paths exist for the netting set.
    pub fn contains(&self, netting_set: &str) -> bool {
        self.paths.contains_key(netting_set)
    }
}

impl CollateralPathProvider for StaticCollateralPaths {
    fn balance_paths(
        &self,
        inputs: &CollateralInputs<'_>,
    ) -> Result<Option<CollateralBalancePaths>, AggregationError> {
        match self.paths.get(inputs.netting_set) {
            Some(paths) => {
                paths.check_grid(inputs.netting_set, inputs.dates.len(), inputs.samples())?;
                Ok(Some(paths.clone()))
            }
            None => Ok(None),
        }
    }
}

/// Threshold / minimum transfer amount margining on the simulation grid.
///
/// The credit support amount is
/// `IA + max(V - H, 0) - max(-V - H, 0)` in CSA currency, where `H` is the
/// threshold. A call is made when it moves the balance by at least the
/// MTA. The margin period of risk is one grid step:
///
/// - `Symmetric`: balance follows the previous date's value
/// - `AsymmetricCVA`: the lower of lagged and current balance
/// - `AsymmetricDVA`: the higher of lagged and current balance
/// - `NoLag`: balance follows the current value
///
/// Balances are zero after the netting set matures.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdCollateralModel;

impl ThresholdCollateralModel {
    fn credit_support(csa: &CollateralAgreement, value: f64) -> f64 {
        let h = csa.threshold();
        csa.independent_amount() + (value - h).max(0.0) - (-value - h).max(0.0)
    }

    fn margin_call(csa: &CollateralAgreement, held: f64, required: f64) -> f64 {
        if (required - held).abs() >= csa.mta() {
            required
        } else {
            held
        }
    }
}

impl CollateralPathProvider for ThresholdCollateralModel {
    fn balance_paths(
        &self,
        inputs: &CollateralInputs<'_>,
    ) -> Result<Option<CollateralBalancePaths>, AggregationError> {
        let csa = inputs.csa;
        let samples = inputs.samples();
        let today = Self::credit_support(csa, inputs.npv_today);

        let mut balances = Vec::with_capacity(inputs.dates.len());
        // Held collateral in CSA currency per sample.
        let mut held = vec![Self::margin_call(csa, 0.0, today); samples];
        let mut lagged_required = vec![today; samples];

        for (j, date) in inputs.dates.iter().enumerate() {
            let row = &inputs.values[j];
            let mut out = Vec::with_capacity(samples);
            for k in 0..samples {
                if *date > inputs.maturity {
                    out.push(0.0);
                    continue;
                }
                let fx = inputs.fx(j, k);
                let current = Self::credit_support(csa, row[k] / fx);
                let required = match inputs.calculation_type {
                    CollateralCalculationType::Symmetric => lagged_required[k],
                    CollateralCalculationType::AsymmetricCVA => lagged_required[k].min(current),
                    CollateralCalculationType::AsymmetricDVA => lagged_required[k].max(current),
                    CollateralCalculationType::NoLag => current,
                };
                held[k] = Self::margin_call(csa, held[k], required);
                lagged_required[k] = current;
                out.push(held[k] * fx);
            }
            balances.push(out);
        }

        Ok(Some(CollateralBalancePaths::new(balances)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> (Date, Vec<Date>) {
        let today = Date::from_ymd(2024, 1, 2).unwrap();
        let dates = vec![
            Date::from_ymd(2024, 4, 2).unwrap(),
            Date::from_ymd(2024, 7, 2).unwrap(),
            Date::from_ymd(2024, 10, 2).unwrap(),
        ];
        (today, dates)
    }

    fn inputs<'a>(
        csa: &'a CollateralAgreement,
        values: &'a [Vec<f64>],
        dates: &'a [Date],
        today: Date,
        calculation_type: CollateralCalculationType,
    ) -> CollateralInputs<'a> {
        CollateralInputs {
            netting_set: "NS1",
            csa,
            npv_today: 0.0,
            values,
            asof: today,
            dates,
            maturity: dates[dates.len() - 1],
            calculation_type,
            fx_rates: None,
            index_fixings: None,
        }
    }

    #[test]
    fn test_balance_outside_grid_is_zero() {
        let paths = CollateralBalancePaths::new(vec![vec![1.0]]);
        assert_eq!(paths.balance(0, 0), 1.0);
        assert_eq!(paths.balance(1, 0), 0.0);
        assert_eq!(paths.balance(0, 3), 0.0);
    }

    #[test]
    fn test_no_collateral_returns_none() {
        let (today, dates) = grid();
        let csa = CollateralAgreement::new("EUR");
        let values = vec![vec![1.0]; 3];
        let i = inputs(&csa, &values, &dates, today, CollateralCalculationType::Symmetric);
        assert!(NoCollateral.balance_paths(&i).unwrap().is_none());
    }

    #[test]
    fn test_static_paths_checked_against_grid() {
        let (today, dates) = grid();
        let csa = CollateralAgreement::new("EUR");
        let values = vec![vec![1.0, 2.0]; 3];
        let i = inputs(&csa, &values, &dates, today, CollateralCalculationType::Symmetric);

        let provider = StaticCollateralPaths::new()
            .with_paths("NS1", CollateralBalancePaths::new(vec![vec![0.0, 0.0]; 2]));
        assert!(matches!(
            provider.balance_paths(&i),
            Err(AggregationError::DimensionMismatch { expected: 3, actual: 2, .. })
        ));

        let provider = StaticCollateralPaths::new()
            .with_paths("NS2", CollateralBalancePaths::new(vec![vec![0.0, 0.0]; 3]));
        assert!(provider.balance_paths(&i).unwrap().is_none());
    }

    #[test]
    fn test_no_lag_zero_threshold_fully_collateralised() {
        let (today, dates) = grid();
        let csa = CollateralAgreement::new("EUR");
        let values = vec![vec![10.0, -4.0], vec![6.0, 2.0], vec![-1.0, 3.0]];
        let i = inputs(&csa, &values, &dates, today, CollateralCalculationType::NoLag);

        let paths = ThresholdCollateralModel.balance_paths(&i).unwrap().unwrap();
        for (j, row) in values.iter().enumerate() {
            for (k, v) in row.iter().enumerate() {
                assert_relative_eq!(paths.balance(j, k), *v);
            }
        }
    }

    #[test]
    fn test_symmetric_lags_one_step() {
        let (today, dates) = grid();
        let csa = CollateralAgreement::new("EUR");
        let values = vec![vec![10.0], vec![6.0], vec![-1.0]];
        let i = inputs(&csa, &values, &dates, today, CollateralCalculationType::Symmetric);

        let paths = ThresholdCollateralModel.balance_paths(&i).unwrap().unwrap();
        assert_relative_eq!(paths.balance(0, 0), 0.0);
        assert_relative_eq!(paths.balance(1, 0), 10.0);
        assert_relative_eq!(paths.balance(2, 0), 6.0);
    }

    #[test]
    fn test_threshold_and_mta() {
        let (today, dates) = grid();
        let csa = CollateralAgreement::new("EUR")
            .with_threshold(5.0)
            .unwrap()
            .with_mta(2.0)
            .unwrap();
        let values = vec![vec![6.0], vec![10.0], vec![4.0]];
        let i = inputs(&csa, &values, &dates, today, CollateralCalculationType::NoLag);

        let paths = ThresholdCollateralModel.balance_paths(&i).unwrap().unwrap();
        // Call of 1 is below the MTA.
        assert_relative_eq!(paths.balance(0, 0), 0.0);
        assert_relative_eq!(paths.balance(1, 0), 5.0);
        assert_relative_eq!(paths.balance(2, 0), 0.0);
    }

    #[test]
    fn test_asymmetric_cva_takes_lower_balance() {
        let (today, dates) = grid();
        let csa = CollateralAgreement::new("EUR");
        let values = vec![vec![10.0], vec![6.0], vec![8.0]];
        let i = inputs(&csa, &values, &dates, today, CollateralCalculationType::AsymmetricCVA);

        let paths = ThresholdCollateralModel.balance_paths(&i).unwrap().unwrap();
        assert_relative_eq!(paths.balance(0, 0), 0.0);
        assert_relative_eq!(paths.balance(1, 0), 6.0);
        assert_relative_eq!(paths.balance(2, 0), 6.0);
    }

    #[test]
    fn test_fx_conversion() {
        let (today, dates) = grid();
        let csa = CollateralAgreement::new("USD").with_threshold(1.0).unwrap();
        let values = vec![vec![3.0]; 3];
        let fx = vec![vec![0.5]; 3];
        let mut i = inputs(&csa, &values, &dates, today, CollateralCalculationType::NoLag);
        i.fx_rates = Some(&fx);

        let paths = ThresholdCollateralModel.balance_paths(&i).unwrap().unwrap();
        // 3 EUR = 6 USD, minus 1 USD threshold, back to EUR.
        assert_relative_eq!(paths.balance(0, 0), 2.5);
    }
}
