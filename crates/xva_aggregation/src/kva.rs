//! Capital valuation adjustment (KVA).
//!
//! Cost of holding regulatory capital against counterparty credit risk
//! (CCR, Basel IRB with IMM exposure) and CVA risk (standardised charge)
//! over the life of each netting set.
//!
//! # Formulas
//!
//! For each simulation period (d₀, d₁]:
//!
//! RC = α × EEPE × LGD × PD99.9 × MA(PD, M)
//! SCVA = RW × M × EEPE
//! KVA += capital × (1 + r)^(−t(d₀)) × Δt × hurdle × regulatory adjustment
//!
//! "Our" capital is computed on EPE with the counterparty's credit, "their"
//! capital on ENE with our own credit.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, warn};
use xva_core::math::{norm_cdf, norm_inv_cdf};
use xva_core::types::{Date, DayCountConvention};

use crate::config::KvaParams;
use crate::error::AggregationError;
use crate::exposure::NettedExposure;
use crate::market::{discount_factors, Market};
use crate::portfolio::NettingSetManager;

const PD_CAP: f64 = 1e-12;
const CONFIDENCE: f64 = 0.999;
const MAX_MATURITY: f64 = 5.0;

/// KVA of one netting set with its per-period increments.
#[derive(Debug, Clone, PartialEq)]
pub struct KvaResult {
    our_ccr: Vec<f64>,
    their_ccr: Vec<f64>,
    our_cva: Vec<f64>,
    their_cva: Vec<f64>,
}

impl KvaResult {
    /// Zero KVA over `periods` simulation periods.
    pub fn zero(periods: usize) -> Self {
        Self {
            our_ccr: vec![0.0; periods],
            their_ccr: vec![0.0; periods],
            our_cva: vec![0.0; periods],
            their_cva: vec![0.0; periods],
        }
    }

    /// Our CCR capital cost.
    pub fn our_kva_ccr(&self) -> f64 {
        self.our_ccr.iter().sum()
    }

    /// Their CCR capital cost.
    pub fn their_kva_ccr(&self) -> f64 {
        self.their_ccr.iter().sum()
    }

    /// Our CVA capital cost.
    pub fn our_kva_cva(&self) -> f64 {
        self.our_cva.iter().sum()
    }

    /// Their CVA capital cost.
    pub fn their_kva_cva(&self) -> f64 {
        self.their_cva.iter().sum()
    }

    /// Our CCR cost per period.
    #[inline]
    pub fn our_ccr_increments(&self) -> &[f64] {
        &self.our_ccr
    }

    /// Their CCR cost per period.
    #[inline]
    pub fn their_ccr_increments(&self) -> &[f64] {
        &self.their_ccr
    }

    /// Our CVA capital cost per period.
    #[inline]
    pub fn our_cva_increments(&self) -> &[f64] {
        &self.our_cva
    }

    /// Their CVA capital cost per period.
    #[inline]
    pub fn their_cva_increments(&self) -> &[f64] {
        &self.their_cva
    }
}

/// Credit inputs of one capital side.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CapitalCredit {
    lgd: f64,
    floored_pd99: f64,
    maturity_b: f64,
}

/// Asymptotic single risk factor correlation for corporates and banks.
fn asset_correlation(pd: f64) -> f64 {
    let ratio = (1.0 - (-50.0 * pd).exp()) / (1.0 - (-50.0_f64).exp());
    0.12 * ratio + 0.24 * (1.0 - ratio)
}

/// Worst-case default probability at 99.9% less the expected one.
pub fn unexpected_default_probability(pd: f64) -> f64 {
    if pd <= 0.0 {
        return 0.0;
    }
    let rho = asset_correlation(pd);
    let z = (norm_inv_cdf(pd) + rho.sqrt() * norm_inv_cdf(CONFIDENCE)) / (1.0 - rho).sqrt();
    norm_cdf(z) - pd
}

/// Maturity adjustment slope b(PD).
pub fn maturity_adjustment_slope(pd: f64) -> f64 {
    (0.11852 - 0.05478 * pd.max(PD_CAP).ln()).powi(2)
}

/// Maturity adjustment MA(PD, M), bounded to [1, 5].
pub fn maturity_adjustment(maturity: f64, b: f64) -> f64 {
    ((1.0 + (maturity - 2.5) * b) / (1.0 - 1.5 * b)).clamp(1.0, 5.0)
}

impl CapitalCredit {
    fn new(pd: f64, lgd: f64, pd_floor: f64) -> Self {
        Self {
            lgd,
            floored_pd99: unexpected_default_probability(pd).max(pd_floor),
            maturity_b: maturity_adjustment_slope(pd),
        }
    }
}

/// Per-period capital exposure statistics of one side.
#[derive(Debug, Clone, Copy, Default)]
struct PeriodExposure {
    eepe: f64,
    /// Effective maturity before the cap at 5 years.
    maturity: f64,
}

/// Computes KVA per netting set from netted EPE/ENE profiles.
///
/// # Examples
///
/// ```
/// use xva_aggregation::kva::{maturity_adjustment, maturity_adjustment_slope, unexpected_default_probability};
///
/// let pd = 0.01;
/// assert!(unexpected_default_probability(pd) > pd);
/// assert_eq!(unexpected_default_probability(0.0), 0.0);
///
/// let b = maturity_adjustment_slope(pd);
/// assert!((maturity_adjustment(2.5, b) - 1.0 / (1.0 - 1.5 * b)).abs() < 1e-12);
/// ```
pub struct RegulatoryCapitalEngine<'a> {
    market: &'a dyn Market,
    params: &'a KvaParams,
    base_currency: &'a str,
    dva_name: Option<&'a str>,
}

impl<'a> RegulatoryCapitalEngine<'a> {
    /// Creates the engine.
    pub fn new(
        market: &'a dyn Market,
        params: &'a KvaParams,
        base_currency: &'a str,
        dva_name: Option<&'a str>,
    ) -> Self {
        Self {
            market,
            params,
            base_currency,
            dva_name,
        }
    }

    /// KVA of every netting set of `netted`, keyed by id.
    pub fn calculate(
        &self,
        netted: &NettedExposure,
        netting_sets: &NettingSetManager,
    ) -> Result<HashMap<String, KvaResult>, AggregationError> {
        let cube = netted.cube();
        let dates = cube.dates();
        let discounts = discount_factors(self.market, self.base_currency, dates)?;
        let own = self.own_credit(cube.asof())?;

        netted
            .ids()
            .par_iter()
            .map(|id| {
                let definition = netting_sets
                    .get(id)
                    .ok_or_else(|| AggregationError::NettingSetNotFound(id.clone()))?;
                let profile = netted.profile(id)?;
                let ours = self.counterparty_credit(definition.counterparty_id().as_str(), cube.asof())?;
                let result = self.netting_set_kva(
                    id,
                    cube.asof(),
                    dates,
                    &discounts,
                    profile.epe(),
                    profile.ene(),
                    ours,
                    own,
                );
                Ok::<_, AggregationError>((id.clone(), result))
            })
            .collect()
    }

    fn one_year_pd(&self, name: &str, asof: Date) -> Result<Option<f64>, AggregationError> {
        let Some(curve) = self.market.default_curve(name) else {
            return Ok(None);
        };
        let t = DayCountConvention::ActualActualIsda.year_fraction(asof, asof.add_years(1)?);
        Ok(Some(curve.default_probability(t)?.max(PD_CAP)))
    }

    fn counterparty_credit(&self, name: &str, asof: Date) -> Result<CapitalCredit, AggregationError> {
        let pd = self
            .one_year_pd(name, asof)?
            .ok_or_else(|| AggregationError::MissingDefaultCurve(name.to_string()))?;
        let recovery = self
            .market
            .recovery_rate(name)
            .ok_or_else(|| AggregationError::MissingDefaultCurve(name.to_string()))?;
        let credit = CapitalCredit::new(pd, 1.0 - recovery, self.params.their_pd_floor);
        debug!(counterparty = name, pd, lgd = credit.lgd, pd99 = credit.floored_pd99, b = credit.maturity_b, "our CCR capital inputs");
        Ok(credit)
    }

    fn own_credit(&self, asof: Date) -> Result<CapitalCredit, AggregationError> {
        let (pd, recovery) = match self.dva_name {
            Some(name) => {
                let pd = self.one_year_pd(name, asof)?;
                if pd.is_none() {
                    warn!(dva_name = name, "own default curve missing, own PD set to zero for their KVA");
                }
                (pd.unwrap_or(0.0), self.market.recovery_rate(name).unwrap_or(0.0))
            }
            None => {
                warn!("own credit name not set, own PD set to zero for their KVA");
                (0.0, 0.0)
            }
        };
        let credit = CapitalCredit::new(pd, 1.0 - recovery, self.params.our_pd_floor);
        debug!(pd, lgd = credit.lgd, pd99 = credit.floored_pd99, b = credit.maturity_b, "their CCR capital inputs");
        Ok(credit)
    }

    #[allow(clippy::too_many_arguments)]
    fn netting_set_kva(
        &self,
        id: &str,
        asof: Date,
        dates: &[Date],
        discounts: &[f64],
        epe: &[f64],
        ene: &[f64],
        ours: CapitalCredit,
        theirs: CapitalCredit,
    ) -> KvaResult {
        let p = self.params;
        let dc = DayCountConvention::ActualActualIsda;
        let n = dates.len();
        let mut result = KvaResult::zero(n);

        for j in 0..n {
            let d0 = if j == 0 { asof } else { dates[j - 1] };
            let d1 = dates[j];
            let (our_exposure, their_exposure) = period_exposures(dates, j, discounts, epe, ene, asof);

            let capital_discount = 1.0 / (1.0 + p.capital_discount_rate).powf(dc.year_fraction(asof, d0));
            let cost = capital_discount * dc.year_fraction(d0, d1) * p.capital_hurdle * p.regulatory_adjustment;

            let ccr = |e: PeriodExposure, c: CapitalCredit| {
                let ma = maturity_adjustment(e.maturity.min(MAX_MATURITY), c.maturity_b);
                p.alpha * e.eepe * c.lgd * c.floored_pd99 * ma
            };
            result.our_ccr[j] = ccr(our_exposure, ours) * cost;
            result.their_ccr[j] = ccr(their_exposure, theirs) * cost;
            result.our_cva[j] = p.their_cva_risk_weight * our_exposure.maturity * our_exposure.eepe * cost;
            result.their_cva[j] = p.our_cva_risk_weight * their_exposure.maturity * their_exposure.eepe * cost;
        }

        debug!(
            netting_set = id,
            our_kva_ccr = result.our_kva_ccr(),
            their_kva_ccr = result.their_kva_ccr(),
            our_kva_cva = result.our_kva_cva(),
            their_kva_cva = result.their_kva_cva(),
            "netting set KVA"
        );
        result
    }
}

/// EEPE and effective maturity as seen from simulation date `j`, for EPE
/// (ours) and ENE (theirs). Profiles carry today at index 0.
fn period_exposures(
    dates: &[Date],
    j: usize,
    discounts: &[f64],
    epe: &[f64],
    ene: &[f64],
    asof: Date,
) -> (PeriodExposure, PeriodExposure) {
    let dc = DayCountConvention::ActualActualIsda;
    let n = dates.len();
    let d1 = dates[j];
    // One year and four days ahead; dates are checked in order so an
    // unrepresentable horizon only means the window runs to the last date.
    let horizon = d1.add_years(1).and_then(|d| d.add_days(4)).ok();
    let mut kmax = j;
    while kmax < n - 1 && horizon.map_or(true, |h| dates[kmax] < h) {
        kmax += 1;
    }

    let (mut eee1, mut eee2) = (0.0_f64, 0.0_f64);
    let (mut numer1, mut numer2, mut denom1, mut denom2) = (0.0, 0.0, 0.0, 0.0);
    let (mut eepe1, mut eepe2, mut sum_dt) = (0.0, 0.0, 0.0);
    let (mut eee1_b, mut eee2_b) = (0.0_f64, 0.0_f64);
    let mut steps = 0;

    for k in j..n {
        let d2 = dates[k];
        let previous = if k == 0 { asof } else { dates[k - 1] };
        let accrual = dc.year_fraction(previous, d2);
        eee1 = eee1.max(epe[k + 1]);
        eee2 = eee2.max(ene[k + 1]);

        if dc.year_fraction(d1, d2) > 1.0 {
            numer1 += epe[k + 1] * accrual;
            numer2 += ene[k + 1] * accrual;
        } else {
            denom1 += eee1 * accrual;
            denom2 += eee2 * accrual;
        }

        if k < kmax {
            let dt = dc.year_fraction(dates[k], dates[k + 1]);
            sum_dt += dt;
            eee1_b = eee1_b.max(epe[k + 1] / discounts[k]);
            eee2_b = eee2_b.max(ene[k + 1] / discounts[k]);
            eepe1 += eee1_b * dt;
            eepe2 += eee2_b * dt;
            steps += 1;
        }
    }

    let normalise = |v: f64| if steps > 0 { v / sum_dt } else { 0.0 };
    let maturity = |numer: f64, denom: f64| 1.0 + if denom == 0.0 { 0.0 } else { numer / denom };
    (
        PeriodExposure {
            eepe: normalise(eepe1),
            maturity: maturity(numer1, denom1),
        },
        PeriodExposure {
            eepe: normalise(eepe2),
            maturity: maturity(numer2, denom2),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quarterly_dates(asof: Date, count: usize) -> Vec<Date> {
        (1..=count)
            .map(|q| {
                let months = 3 * q as u32;
                let y = asof.year() + ((asof.month() - 1 + months) / 12) as i32;
                let m = (asof.month() - 1 + months) % 12 + 1;
                Date::from_ymd(y, m, asof.day()).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_unexpected_pd_known_value() {
        // Vasicek 99.9% quantile at PD = 1%: rho ≈ 0.193, PD99 ≈ 0.13.
        let pd = 0.01;
        let rho = asset_correlation(pd);
        assert_relative_eq!(rho, 0.12 * 0.393469 / (1.0 - (-50.0_f64).exp()) + 0.24 * (1.0 - 0.393469), epsilon = 1e-6);
        let pd99 = unexpected_default_probability(pd);
        assert!(pd99 > 0.1 && pd99 < 0.2, "pd99 = {}", pd99);
    }

    #[test]
    fn test_maturity_adjustment_bounds() {
        let b = maturity_adjustment_slope(0.01);
        assert_eq!(maturity_adjustment(-100.0, b), 1.0);
        assert_eq!(maturity_adjustment(1000.0, b), 5.0);
        assert!(maturity_adjustment_slope(0.0).is_finite());
    }

    #[test]
    fn test_period_exposures_flat_profile() {
        let asof = Date::from_ymd(2024, 1, 2).unwrap();
        let dates = quarterly_dates(asof, 12);
        let epe = vec![10.0; 13];
        let ene = vec![0.0; 13];
        let discounts = vec![1.0; 12];
        let (ours, theirs) = period_exposures(&dates, 0, &discounts, &epe, &ene, asof);

        assert_relative_eq!(ours.eepe, 10.0, epsilon = 1e-12);
        assert_eq!(theirs.eepe, 0.0);
        assert_eq!(theirs.maturity, 1.0);
        // 21 months beyond one year over 15 months within it.
        assert_relative_eq!(ours.maturity, 1.0 + 1.75 / 1.25, epsilon = 0.02);
    }

    #[test]
    fn test_period_exposures_last_date_has_no_step() {
        let asof = Date::from_ymd(2024, 1, 2).unwrap();
        let dates = quarterly_dates(asof, 4);
        let epe = vec![5.0; 5];
        let (ours, _) = period_exposures(&dates, 3, &[1.0; 4], &epe, &epe, asof);
        assert_eq!(ours.eepe, 0.0);
    }

    #[test]
    fn test_zero_result_totals() {
        let r = KvaResult::zero(3);
        assert_eq!(r.our_kva_ccr(), 0.0);
        assert_eq!(r.their_cva_increments().len(), 3);
    }
}
