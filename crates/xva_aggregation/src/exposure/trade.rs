//! Standalone trade exposure.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use tracing::debug;

use crate::config::{AggregationConfig, CollateralCalculationType};
use crate::cube::{AllocatedSlots, ExposureCube, MeasureSlot, ValuationCube, TRADE_CUBE_DEPTH};
use crate::error::AggregationError;
use crate::market::{discount_factors, Market};
use crate::portfolio::Portfolio;

use super::{one_year_averages, one_year_horizon, potential_future_exposure, running_max};

/// Standalone exposure profile of one trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeProfile {
    epe: Vec<f64>,
    ene: Vec<f64>,
    ee_b: Vec<f64>,
    eee_b: Vec<f64>,
    pfe: Vec<f64>,
    epe_b: f64,
    eepe_b: f64,
}

impl TradeProfile {
    /// Expected positive exposure.
    #[inline]
    pub fn epe(&self) -> &[f64] {
        &self.epe
    }

    /// Expected negative exposure.
    #[inline]
    pub fn ene(&self) -> &[f64] {
        &self.ene
    }

    /// Basel expected exposure (EPE over discount factor).
    #[inline]
    pub fn ee_b(&self) -> &[f64] {
        &self.ee_b
    }

    /// Basel effective expected exposure (running max of EE_B).
    #[inline]
    pub fn eee_b(&self) -> &[f64] {
        &self.eee_b
    }

    /// Potential future exposure at the configured quantile.
    #[inline]
    pub fn pfe(&self) -> &[f64] {
        &self.pfe
    }

    /// One-year time-weighted EE_B.
    #[inline]
    pub fn epe_b(&self) -> f64 {
        self.epe_b
    }

    /// One-year time-weighted EEE_B.
    #[inline]
    pub fn eepe_b(&self) -> f64 {
        self.eepe_b
    }
}

/// Output of [`TradeExposureCalculator::build`].
#[derive(Debug, Clone)]
pub struct TradeExposure {
    cube: ExposureCube,
    profiles: Vec<TradeProfile>,
    index: HashMap<String, usize>,
    default_values: BTreeMap<String, Vec<Vec<f64>>>,
    close_out_values: BTreeMap<String, Vec<Vec<f64>>>,
}

impl TradeExposure {
    /// Trade exposure cube with EPE, ENE and allocated EPE/ENE depths.
    #[inline]
    pub fn cube(&self) -> &ExposureCube {
        &self.cube
    }

    /// Write access to the allocated slots of the trade cube.
    pub fn allocated_slots_mut(&mut self) -> Option<AllocatedSlots<'_>> {
        self.cube.allocated_slots_mut()
    }

    /// Profile of a trade.
    pub fn profile(&self, trade_id: &str) -> Result<&TradeProfile, AggregationError> {
        self.index
            .get(trade_id)
            .map(|&i| &self.profiles[i])
            .ok_or_else(|| AggregationError::TradeNotFound(trade_id.to_string()))
    }

    /// Profiles in portfolio order.
    #[inline]
    pub fn profiles(&self) -> &[TradeProfile] {
        &self.profiles
    }

    /// Netting-set sums of trade default values, date × sample, by id.
    #[inline]
    pub fn netting_set_default_values(&self) -> &BTreeMap<String, Vec<Vec<f64>>> {
        &self.default_values
    }

    /// Netting-set values used for netting, date × sample, by id.
    ///
    /// Close-out values, or default values under
    /// [`CollateralCalculationType::NoLag`].
    #[inline]
    pub fn netting_set_values(&self) -> &BTreeMap<String, Vec<Vec<f64>>> {
        &self.close_out_values
    }
}

/// Computes standalone trade profiles from a valuation cube.
///
/// # Examples
///
/// ```
/// use xva_aggregation::cube::{ExposureCube, ValuationCube};
/// use xva_aggregation::exposure::TradeExposureCalculator;
/// use xva_aggregation::market::SimpleMarket;
/// use xva_aggregation::portfolio::{PortfolioBuilder, Trade};
/// use xva_aggregation::AggregationConfig;
/// use xva_core::types::Date;
///
/// let today = Date::from_ymd(2024, 1, 2).unwrap();
/// let dates = vec![Date::from_ymd(2024, 7, 2).unwrap()];
/// let portfolio = PortfolioBuilder::new()
///     .add_trade(Trade::new("T1", "NS1", "CP1", dates[0]))
///     .build()
///     .unwrap();
///
/// let mut npv = ExposureCube::new(vec!["T1".to_string()], today, dates, 2, 1).unwrap();
/// npv.set(0, 0, 0, 0, 4.0);
/// npv.set(0, 0, 1, 0, -2.0);
/// let cube = ValuationCube::regular(npv);
/// let market = SimpleMarket::new(today, "EUR").with_discount_rate("EUR", 0.0);
/// let config = AggregationConfig::default();
///
/// let exposure = TradeExposureCalculator::new(&portfolio, &cube, &market, &config)
///     .build()
///     .unwrap();
/// let profile = exposure.profile("T1").unwrap();
/// assert_eq!(profile.epe(), &[0.0, 2.0]);
/// assert_eq!(profile.ene(), &[0.0, 1.0]);
/// ```
pub struct TradeExposureCalculator<'a> {
    portfolio: &'a Portfolio,
    cube: &'a ValuationCube,
    market: &'a dyn Market,
    config: &'a AggregationConfig,
}

struct TradeRun {
    profile: TradeProfile,
    // date × sample positive and negative parts
    paths: Vec<Vec<(f64, f64)>>,
}

impl<'a> TradeExposureCalculator<'a> {
    /// Creates a calculator over a portfolio aligned with the cube.
    pub fn new(
        portfolio: &'a Portfolio,
        cube: &'a ValuationCube,
        market: &'a dyn Market,
        config: &'a AggregationConfig,
    ) -> Self {
        Self {
            portfolio,
            cube,
            market,
            config,
        }
    }

    /// Computes trade profiles and netting-set value matrices.
    pub fn build(&self) -> Result<TradeExposure, AggregationError> {
        let npv = self.cube.cube();
        let asof = npv.asof();
        let dates = npv.dates();
        let samples = npv.samples();
        let discounts = discount_factors(self.market, &self.config.base_currency, dates)?;

        let runs: Vec<TradeRun> = self
            .portfolio
            .trades()
            .par_iter()
            .enumerate()
            .map(|(i, trade)| self.trade_run(i, trade.maturity(), &discounts))
            .collect::<Result<_, _>>()?;

        let cube_samples = if self.config.multi_path { samples } else { 1 };
        let ids: Vec<String> = self
            .portfolio
            .ids()
            .map(|id| id.as_str().to_string())
            .collect();
        let mut cube = ExposureCube::new(ids.clone(), asof, dates.to_vec(), cube_samples, TRADE_CUBE_DEPTH)?;
        let epe = MeasureSlot::Epe.depth();
        let ene = MeasureSlot::Ene.depth();
        for (i, run) in runs.iter().enumerate() {
            cube.set_t0(i, epe, run.profile.epe[0]);
            cube.set_t0(i, ene, run.profile.ene[0]);
            if self.config.multi_path {
                for (j, row) in run.paths.iter().enumerate() {
                    for (k, &(p, n)) in row.iter().enumerate() {
                        cube.set(i, j, k, epe, p);
                        cube.set(i, j, k, ene, n);
                    }
                }
            } else {
                for j in 0..dates.len() {
                    cube.set(i, j, 0, epe, run.profile.epe[j + 1]);
                    cube.set(i, j, 0, ene, run.profile.ene[j + 1]);
                }
            }
        }

        let (default_values, close_out_values) = self.netting_set_matrices();
        debug!(
            trades = ids.len(),
            netting_sets = default_values.len(),
            "trade exposure complete"
        );

        let index = ids.into_iter().enumerate().map(|(i, id)| (id, i)).collect();
        Ok(TradeExposure {
            cube,
            profiles: runs.into_iter().map(|r| r.profile).collect(),
            index,
            default_values,
            close_out_values,
        })
    }

    fn trade_run(
        &self,
        i: usize,
        maturity: xva_core::types::Date,
        discounts: &[f64],
    ) -> Result<TradeRun, AggregationError> {
        let npv = self.cube.cube();
        let asof = npv.asof();
        let dates = npv.dates();
        let samples = npv.samples();
        let n = samples as f64;

        let t0 = self.cube.t0_value(i);
        let mut epe = Vec::with_capacity(dates.len() + 1);
        let mut ene = Vec::with_capacity(dates.len() + 1);
        let mut pfe = Vec::with_capacity(dates.len() + 1);
        let mut ee_b = Vec::with_capacity(dates.len() + 1);
        epe.push(t0.max(0.0));
        ene.push((-t0).max(0.0));
        pfe.push(t0.max(0.0));
        ee_b.push(epe[0]);

        let mut paths = Vec::with_capacity(dates.len());
        let mut distribution = vec![0.0; samples];
        for j in 0..dates.len() {
            let mut row = Vec::with_capacity(samples);
            let (mut sum_pos, mut sum_neg) = (0.0, 0.0);
            for (k, slot) in distribution.iter_mut().enumerate() {
                let v = self.cube.default_value(i, j, k);
                let (p, m) = (v.max(0.0), (-v).max(0.0));
                sum_pos += p;
                sum_neg += m;
                *slot = v;
                row.push((p, m));
            }
            epe.push(sum_pos / n);
            ene.push(sum_neg / n);
            ee_b.push(epe[j + 1] / discounts[j]);
            pfe.push(potential_future_exposure(&mut distribution, self.config.quantile));
            paths.push(row);
        }

        let mut eee_b = ee_b.clone();
        running_max(&mut eee_b);
        let horizon = one_year_horizon(asof, maturity)?;
        let (epe_b, eepe_b) = one_year_averages(asof, dates, horizon, &ee_b, &eee_b);

        Ok(TradeRun {
            profile: TradeProfile {
                epe,
                ene,
                ee_b,
                eee_b,
                pfe,
                epe_b,
                eepe_b,
            },
            paths,
        })
    }

    #[allow(clippy::type_complexity)]
    fn netting_set_matrices(
        &self,
    ) -> (BTreeMap<String, Vec<Vec<f64>>>, BTreeMap<String, Vec<Vec<f64>>>) {
        let npv = self.cube.cube();
        let (num_dates, samples) = (npv.num_dates(), npv.samples());

        let mut members: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, trade) in self.portfolio.trades().iter().enumerate() {
            members
                .entry(trade.netting_set_id().as_str().to_string())
                .or_default()
                .push(i);
        }

        let no_lag = self.config.calculation_type == CollateralCalculationType::NoLag;
        let sums: Vec<(String, Vec<Vec<f64>>, Vec<Vec<f64>>)> = members
            .into_par_iter()
            .map(|(id, trades)| {
                let mut default = vec![vec![0.0; samples]; num_dates];
                let mut close_out = vec![vec![0.0; samples]; num_dates];
                for &i in &trades {
                    for j in 0..num_dates {
                        for k in 0..samples {
                            let d = self.cube.default_value(i, j, k);
                            default[j][k] += d;
                            close_out[j][k] += if no_lag {
                                d
                            } else {
                                self.cube.close_out_value(i, j, k)
                            };
                        }
                    }
                }
                (id, default, close_out)
            })
            .collect();

        let mut default_values = BTreeMap::new();
        let mut close_out_values = BTreeMap::new();
        for (id, default, close_out) in sums {
            default_values.insert(id.clone(), default);
            close_out_values.insert(id, close_out);
        }
        (default_values, close_out_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::SimpleMarket;
    use crate::portfolio::{PortfolioBuilder, Trade};
    use approx::assert_relative_eq;
    use xva_core::types::Date;

    fn setup(values: &[[f64; 2]], grid: bool) -> (Portfolio, ValuationCube, SimpleMarket) {
        let today = Date::from_ymd(2024, 1, 2).unwrap();
        let dates = vec![
            Date::from_ymd(2024, 7, 2).unwrap(),
            Date::from_ymd(2025, 1, 2).unwrap(),
        ];
        let portfolio = PortfolioBuilder::new()
            .add_trade(Trade::new("T1", "NS1", "CP1", dates[1]))
            .add_trade(Trade::new("T2", "NS1", "CP1", dates[0]))
            .build()
            .unwrap();
        let depth = if grid { 2 } else { 1 };
        let mut npv = ExposureCube::new(
            vec!["T1".to_string(), "T2".to_string()],
            today,
            dates,
            2,
            depth,
        )
        .unwrap();
        for (j, row) in values.iter().enumerate() {
            for (k, v) in row.iter().enumerate() {
                npv.set(0, j, k, 0, *v);
                npv.set(1, j, k, 0, 1.0);
                if grid {
                    npv.set(0, j, k, 1, *v + 100.0);
                    npv.set(1, j, k, 1, 1.0);
                }
            }
        }
        npv.set_t0(0, 0, -3.0);
        let cube = if grid {
            ValuationCube::close_out_grid(npv).unwrap()
        } else {
            ValuationCube::regular(npv)
        };
        let market = SimpleMarket::new(today, "EUR").with_discount_rate("EUR", 0.05);
        (portfolio, cube, market)
    }

    #[test]
    fn test_trade_profile_values() {
        let (portfolio, cube, market) = setup(&[[10.0, -4.0], [6.0, 2.0]], false);
        let config = AggregationConfig::default();
        let exposure = TradeExposureCalculator::new(&portfolio, &cube, &market, &config)
            .build()
            .unwrap();

        let p = exposure.profile("T1").unwrap();
        assert_eq!(p.epe(), &[0.0, 5.0, 4.0]);
        assert_eq!(p.ene(), &[3.0, 2.0, 0.0]);
        assert_eq!(p.pfe(), &[0.0, 10.0, 6.0]);
        let df0 = crate::market::discount_factor(&market, "EUR", cube.cube().dates()[0]).unwrap();
        assert_relative_eq!(p.ee_b()[1], 5.0 / df0, epsilon = 1e-12);
        assert_relative_eq!(p.eee_b()[2], p.ee_b()[1].max(p.ee_b()[2]), epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_trade() {
        let (portfolio, cube, market) = setup(&[[1.0, 1.0], [1.0, 1.0]], false);
        let config = AggregationConfig::default();
        let exposure = TradeExposureCalculator::new(&portfolio, &cube, &market, &config)
            .build()
            .unwrap();
        assert!(matches!(exposure.profile("T9"), Err(AggregationError::TradeNotFound(_))));
    }

    #[test]
    fn test_multi_path_and_single_path_cube() {
        let (portfolio, cube, market) = setup(&[[10.0, -4.0], [6.0, 2.0]], false);
        let mut config = AggregationConfig::default();
        let multi = TradeExposureCalculator::new(&portfolio, &cube, &market, &config)
            .build()
            .unwrap();
        assert_eq!(multi.cube().samples(), 2);
        assert_eq!(multi.cube().get(0, 0, 1, MeasureSlot::Ene.depth()), 4.0);
        assert_eq!(multi.cube().get_t0(0, MeasureSlot::Ene.depth()), 3.0);

        config.multi_path = false;
        let single = TradeExposureCalculator::new(&portfolio, &cube, &market, &config)
            .build()
            .unwrap();
        assert_eq!(single.cube().samples(), 1);
        assert_eq!(single.cube().get(0, 0, 0, MeasureSlot::Epe.depth()), 5.0);
        assert_eq!(single.cube().depth(), TRADE_CUBE_DEPTH);
    }

    #[test]
    fn test_netting_set_matrices_follow_interpretation() {
        let (portfolio, cube, market) = setup(&[[10.0, -4.0], [6.0, 2.0]], true);
        let mut config = AggregationConfig::default();
        let exposure = TradeExposureCalculator::new(&portfolio, &cube, &market, &config)
            .build()
            .unwrap();
        assert_eq!(exposure.netting_set_default_values()["NS1"][0], vec![11.0, -3.0]);
        assert_eq!(exposure.netting_set_values()["NS1"][0], vec![111.0, 97.0]);

        config.calculation_type = CollateralCalculationType::NoLag;
        let exposure = TradeExposureCalculator::new(&portfolio, &cube, &market, &config)
            .build()
            .unwrap();
        assert_eq!(exposure.netting_set_values()["NS1"][0], vec![11.0, -3.0]);
    }
}
