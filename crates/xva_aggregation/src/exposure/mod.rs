//! Exposure profiles.
//!
//! - [`TradeExposureCalculator`]: standalone trade profiles and the
//!   netting-set value matrices fed to netting
//! - [`NettedExposureCalculator`]: collateralised netting-set profiles,
//!   COLVA and collateral floor
//!
//! Profiles have one entry per simulation date plus today at index 0.

mod netted;
mod trade;

pub use netted::{NettedExposure, NettedExposureCalculator, NettingSetProfile};
pub use trade::{TradeExposure, TradeExposureCalculator, TradeProfile};

use xva_core::types::{Date, DayCountConvention};

use crate::error::AggregationError;

/// Nearest-rank quantile of a distribution, floored at zero.
///
/// Sorts `distribution` in place and reads index `⌊q·(N−1)+0.5⌋`.
pub(crate) fn potential_future_exposure(distribution: &mut [f64], quantile: f64) -> f64 {
    if distribution.is_empty() {
        return 0.0;
    }
    distribution.sort_by(f64::total_cmp);
    let last = distribution.len() - 1;
    let index = (quantile * last as f64 + 0.5).floor().max(0.0) as usize;
    distribution[index.min(last)].max(0.0)
}

/// End of the Basel one-year window: one year and four days after today,
/// rolled forward over weekends, capped at `maturity`.
pub(crate) fn one_year_horizon(asof: Date, maturity: Date) -> Result<Date, AggregationError> {
    let one_year = asof.add_years(1)?.add_days(4)?.adjust_weekends_following()?;
    Ok(one_year.min(maturity))
}

/// Time-weighted EE_B and EEE_B averages over the dates up to `horizon`.
///
/// Weights are the year-fraction increments between simulation dates, the
/// first one measured from today, normalised to one. Weight `k` multiplies
/// profile entry `k`. Returns zeros when no date falls in the window.
pub(crate) fn one_year_averages(
    asof: Date,
    dates: &[Date],
    horizon: Date,
    ee_b: &[f64],
    eee_b: &[f64],
) -> (f64, f64) {
    let dc = DayCountConvention::ActualActualIsda;
    let horizon_time = dc.year_fraction(asof, horizon);
    let times: Vec<f64> = dates
        .iter()
        .map(|&d| dc.year_fraction(asof, d))
        .take_while(|&t| t <= horizon_time)
        .collect();
    if times.is_empty() {
        return (0.0, 0.0);
    }

    let mut weights = Vec::with_capacity(times.len());
    weights.push(times[0]);
    weights.extend(times.windows(2).map(|w| w[1] - w[0]));
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return (0.0, 0.0);
    }

    weights
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(epe_b, eepe_b), (k, w)| {
            let w = w / total;
            (epe_b + w * ee_b[k], eepe_b + w * eee_b[k])
        })
}

/// Running maximum, in place.
pub(crate) fn running_max(values: &mut [f64]) {
    let mut current = f64::NEG_INFINITY;
    for v in values.iter_mut() {
        current = current.max(*v);
        *v = current;
    }
}
