//! Netting-set exposure with collateral and initial margin.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use tracing::debug;
use xva_core::types::{Date, DayCountConvention};

use crate::collateral::{CollateralBalancePaths, CollateralInputs, CollateralPathProvider, NoCollateral};
use crate::config::AggregationConfig;
use crate::cube::{ExposureCube, MeasureSlot, ValuationCube, NETTING_CUBE_DEPTH};
use crate::error::AggregationError;
use crate::margin::DynamicInitialMargin;
use crate::market::{discount_factors, Market};
use crate::portfolio::{CollateralAgreement, NettingSetManager, Portfolio};
use crate::scenario::{ScenarioData, ScenarioDataKind};

use super::{one_year_averages, one_year_horizon, potential_future_exposure};

/// Collateralised exposure profile of one netting set.
///
/// Sequences have one entry per simulation date plus today at index 0.
#[derive(Debug, Clone, PartialEq)]
pub struct NettingSetProfile {
    epe: Vec<f64>,
    ene: Vec<f64>,
    ee_b: Vec<f64>,
    eee_b: Vec<f64>,
    pfe: Vec<f64>,
    expected_collateral: Vec<f64>,
    colva_increments: Vec<f64>,
    collateral_floor_increments: Vec<f64>,
    epe_b: f64,
    eepe_b: f64,
    colva: f64,
    collateral_floor: f64,
}

impl NettingSetProfile {
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

    /// Basel expected exposure.
    #[inline]
    pub fn ee_b(&self) -> &[f64] {
        &self.ee_b
    }

    /// Basel effective expected exposure.
    #[inline]
    pub fn eee_b(&self) -> &[f64] {
        &self.eee_b
    }

    /// Potential future exposure.
    #[inline]
    pub fn pfe(&self) -> &[f64] {
        &self.pfe
    }

    /// Mean collateral balance.
    #[inline]
    pub fn expected_collateral(&self) -> &[f64] {
        &self.expected_collateral
    }

    /// COLVA contribution per date.
    #[inline]
    pub fn colva_increments(&self) -> &[f64] {
        &self.colva_increments
    }

    /// Collateral floor contribution per date.
    #[inline]
    pub fn collateral_floor_increments(&self) -> &[f64] {
        &self.collateral_floor_increments
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

    /// Collateral valuation adjustment.
    #[inline]
    pub fn colva(&self) -> f64 {
        self.colva
    }

    /// Value of the zero floor on the collateral compounding rate.
    #[inline]
    pub fn collateral_floor(&self) -> f64 {
        self.collateral_floor
    }
}

/// Output of [`NettedExposureCalculator::build`].
#[derive(Debug, Clone)]
pub struct NettedExposure {
    cube: ExposureCube,
    profiles: Vec<NettingSetProfile>,
    index: HashMap<String, usize>,
}

macro_rules! profile_accessors {
    ($( $(#[$doc:meta])* $name:ident -> $ty:ty ),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(&self, netting_set_id: &str) -> Result<$ty, AggregationError> {
                Ok(self.profile(netting_set_id)?.$name())
            }
        )*
    };
}

impl NettedExposure {
    /// Netting-set exposure cube with EPE and ENE depths.
    #[inline]
    pub fn cube(&self) -> &ExposureCube {
        &self.cube
    }

    /// Netting-set ids, sorted.
    #[inline]
    pub fn ids(&self) -> &[String] {
        self.cube.ids()
    }

    /// Profiles in id order.
    #[inline]
    pub fn profiles(&self) -> &[NettingSetProfile] {
        &self.profiles
    }

    /// Profile of a netting set.
    pub fn profile(&self, netting_set_id: &str) -> Result<&NettingSetProfile, AggregationError> {
        self.index
            .get(netting_set_id)
            .map(|&i| &self.profiles[i])
            .ok_or_else(|| AggregationError::NettingSetNotFound(netting_set_id.to_string()))
    }

    profile_accessors! {
        /// Expected positive exposure.
        epe -> &[f64],
        /// Expected negative exposure.
        ene -> &[f64],
        /// Basel expected exposure.
        ee_b -> &[f64],
        /// Basel effective expected exposure.
        eee_b -> &[f64],
        /// Potential future exposure.
        pfe -> &[f64],
        /// Mean collateral balance.
        expected_collateral -> &[f64],
        /// COLVA contribution per date.
        colva_increments -> &[f64],
        /// Collateral floor contribution per date.
        collateral_floor_increments -> &[f64],
        /// One-year time-weighted EE_B.
        epe_b -> f64,
        /// One-year time-weighted EEE_B.
        eepe_b -> f64,
        /// Collateral valuation adjustment.
        colva -> f64,
        /// Collateral floor value.
        collateral_floor -> f64,
    }
}

/// Nets simulated values per netting set, applying collateral and initial
/// margin.
///
/// Netting sets are processed in parallel; within a netting set dates are
/// walked in order.
pub struct NettedExposureCalculator<'a> {
    portfolio: &'a Portfolio,
    cube: &'a ValuationCube,
    netting_sets: &'a NettingSetManager,
    market: &'a dyn Market,
    values: &'a BTreeMap<String, Vec<Vec<f64>>>,
    config: &'a AggregationConfig,
    scenario_data: Option<&'a dyn ScenarioData>,
    collateral: &'a dyn CollateralPathProvider,
    initial_margin: Option<&'a dyn DynamicInitialMargin>,
}

struct NettingSetRun {
    profile: NettingSetProfile,
    // date × sample (epe, ene), multi-path only
    paths: Vec<Vec<(f64, f64)>>,
}

static NO_COLLATERAL: NoCollateral = NoCollateral;

impl<'a> NettedExposureCalculator<'a> {
    /// Creates a calculator.
    ///
    /// `values` holds one date × sample matrix of simulated netting-set
    /// values per netting-set id; its key order fixes the cube order.
    pub fn new(
        portfolio: &'a Portfolio,
        cube: &'a ValuationCube,
        netting_sets: &'a NettingSetManager,
        market: &'a dyn Market,
        values: &'a BTreeMap<String, Vec<Vec<f64>>>,
        config: &'a AggregationConfig,
    ) -> Self {
        Self {
            portfolio,
            cube,
            netting_sets,
            market,
            values,
            config,
            scenario_data: None,
            collateral: &NO_COLLATERAL,
            initial_margin: None,
        }
    }

    /// Sets the scenario data holding FX and index fixings.
    pub fn with_scenario_data(mut self, scenario_data: &'a dyn ScenarioData) -> Self {
        self.scenario_data = Some(scenario_data);
        self
    }

    /// Sets the collateral model.
    pub fn with_collateral_provider(mut self, provider: &'a dyn CollateralPathProvider) -> Self {
        self.collateral = provider;
        self
    }

    /// Sets the initial margin reducing exposure.
    pub fn with_initial_margin(mut self, initial_margin: &'a dyn DynamicInitialMargin) -> Self {
        self.initial_margin = Some(initial_margin);
        self
    }

    /// Computes all netting-set profiles and the netting-set cube.
    pub fn build(&self) -> Result<NettedExposure, AggregationError> {
        let npv = self.cube.cube();
        let dates = npv.dates();
        let samples = npv.samples();
        let discounts = discount_factors(self.market, &self.config.base_currency, dates)?;

        let mut members: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, trade) in self.portfolio.trades().iter().enumerate() {
            members
                .entry(trade.netting_set_id().as_str())
                .or_default()
                .push(i);
        }

        let entries: Vec<(&String, &Vec<Vec<f64>>)> = self.values.iter().collect();
        let runs: Vec<NettingSetRun> = entries
            .par_iter()
            .map(|(id, values)| {
                let trades = members.get(id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                self.netting_set_run(id, trades, values, &discounts)
            })
            .collect::<Result<_, _>>()?;

        let ids: Vec<String> = self.values.keys().cloned().collect();
        let cube_samples = if self.config.multi_path { samples } else { 1 };
        let mut cube = ExposureCube::new(
            ids.clone(),
            npv.asof(),
            dates.to_vec(),
            cube_samples,
            NETTING_CUBE_DEPTH,
        )?;
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

        debug!(netting_sets = ids.len(), "netted exposure complete");
        let index = ids.into_iter().enumerate().map(|(i, id)| (id, i)).collect();
        Ok(NettedExposure {
            cube,
            profiles: runs.into_iter().map(|r| r.profile).collect(),
            index,
        })
    }

    fn netting_set_run(
        &self,
        id: &str,
        trades: &[usize],
        values: &[Vec<f64>],
        discounts: &[f64],
    ) -> Result<NettingSetRun, AggregationError> {
        let npv = self.cube.cube();
        let asof = npv.asof();
        let dates = npv.dates();
        let samples = npv.samples();
        let n = samples as f64;

        if values.len() != dates.len() {
            return Err(AggregationError::DimensionMismatch {
                what: format!("values of netting set {}", id),
                expected: dates.len(),
                actual: values.len(),
            });
        }
        if let Some(row) = values.iter().find(|row| row.len() != samples) {
            return Err(AggregationError::DimensionMismatch {
                what: format!("samples of netting set {}", id),
                expected: samples,
                actual: row.len(),
            });
        }

        let npv_today: f64 = trades.iter().map(|&i| self.cube.t0_value(i)).sum();
        let maturity = trades
            .iter()
            .map(|&i| self.portfolio.trades()[i].maturity())
            .fold(asof, Date::max);

        let definition = self
            .netting_sets
            .get(id)
            .ok_or_else(|| AggregationError::NettingSetNotFound(id.to_string()))?;
        let csa = definition.active_csa();

        let (fx_rates, index_fixings) = match csa {
            Some(csa) => self.csa_scenario_series(id, csa, dates.len(), samples)?,
            None => (None, None),
        };
        let balances: Option<CollateralBalancePaths> = match csa {
            Some(csa) => self.collateral.balance_paths(&CollateralInputs {
                netting_set: id,
                csa,
                npv_today,
                values,
                asof,
                dates,
                maturity,
                calculation_type: self.config.calculation_type,
                fx_rates: fx_rates.as_deref(),
                index_fixings: index_fixings.as_deref(),
            })?,
            None => None,
        };
        let day_counter = csa
            .and_then(CollateralAgreement::index_name)
            .map(|index| self.market.index_day_counter(index))
            .unwrap_or(DayCountConvention::ActualActualIsda);
        let initial_margin = self
            .initial_margin
            .filter(|_| self.config.analytics.dim);

        let size = dates.len() + 1;
        let mut epe = vec![0.0; size];
        let mut ene = vec![0.0; size];
        let mut ee_b = vec![0.0; size];
        let mut eee_b = vec![0.0; size];
        let mut pfe = vec![0.0; size];
        let mut expected_collateral = vec![0.0; size];
        let mut colva_increments = vec![0.0; size];
        let mut floor_increments = vec![0.0; size];
        let (mut colva, mut collateral_floor) = (0.0, 0.0);

        if !(self.config.full_initial_collateralisation && csa.is_some()) {
            epe[0] = npv_today.max(0.0);
            ene[0] = (-npv_today).max(0.0);
            pfe[0] = npv_today.max(0.0);
        }
        expected_collateral[0] = -npv_today;
        ee_b[0] = epe[0];
        eee_b[0] = ee_b[0];

        let mut paths = Vec::with_capacity(if self.config.multi_path { dates.len() } else { 0 });
        let mut distribution = vec![0.0; samples];
        let mut previous = asof;
        for (j, &date) in dates.iter().enumerate() {
            let dcf = day_counter.year_fraction(previous, date);
            let mut row = Vec::with_capacity(if self.config.multi_path { samples } else { 0 });
            for k in 0..samples {
                let balance = balances.as_ref().map_or(0.0, |b| b.balance(j, k));
                let exposure = values[j][k] - balance;
                let margin = match initial_margin {
                    Some(im) => {
                        let m = im.dynamic_im(id, j, k)?;
                        if m < 0.0 {
                            return Err(AggregationError::NegativeInitialMargin {
                                netting_set: id.to_string(),
                                date: j,
                                sample: k,
                                value: m,
                            });
                        }
                        m
                    }
                    None => 0.0,
                };
                let positive = (exposure - margin).max(0.0);
                let negative = (-exposure - margin).max(0.0);
                epe[j + 1] += positive / n;
                ene[j + 1] += negative / n;
                distribution[k] = exposure;
                expected_collateral[j + 1] += balance / n;
                if self.config.multi_path {
                    row.push((positive, negative));
                }

                if let Some(csa) = csa {
                    let fixing = index_fixings.as_ref().map_or(0.0, |m| m[j][k]);
                    let spread = csa.spread_for_balance(balance);
                    let colva_delta = -balance * spread * dcf / n;
                    let floor_delta = -balance * (spread - fixing).max(0.0) * dcf / n;
                    colva_increments[j + 1] += colva_delta;
                    floor_increments[j + 1] += floor_delta;
                    colva += colva_delta;
                    collateral_floor += floor_delta;
                }
            }
            ee_b[j + 1] = epe[j + 1] / discounts[j];
            eee_b[j + 1] = eee_b[j].max(ee_b[j + 1]);
            pfe[j + 1] = potential_future_exposure(&mut distribution, self.config.quantile);
            if self.config.multi_path {
                paths.push(row);
            }
            previous = date;
        }

        let horizon = one_year_horizon(asof, maturity)?;
        let (epe_b, eepe_b) = one_year_averages(asof, dates, horizon, &ee_b, &eee_b);
        debug!(netting_set = id, npv_today, epe_b, eepe_b, colva, "netting set exposure");

        Ok(NettingSetRun {
            profile: NettingSetProfile {
                epe,
                ene,
                ee_b,
                eee_b,
                pfe,
                expected_collateral,
                colva_increments,
                collateral_floor_increments: floor_increments,
                epe_b,
                eepe_b,
                colva,
                collateral_floor,
            },
            paths,
        })
    }

    #[allow(clippy::type_complexity)]
    fn csa_scenario_series(
        &self,
        id: &str,
        csa: &CollateralAgreement,
        num_dates: usize,
        samples: usize,
    ) -> Result<(Option<Vec<Vec<f64>>>, Option<Vec<Vec<f64>>>), AggregationError> {
        let fx_rates = if csa.currency() != self.config.base_currency {
            let pair = format!("{}{}", csa.currency(), self.config.base_currency);
            Some(self.scenario_series(id, ScenarioDataKind::FxSpot, &pair, num_dates, samples)?)
        } else {
            None
        };
        let index_fixings = match csa.index_name() {
            Some(index) => Some(self.scenario_series(
                id,
                ScenarioDataKind::IndexFixing,
                index,
                num_dates,
                samples,
            )?),
            None => None,
        };
        Ok((fx_rates, index_fixings))
    }

    fn scenario_series(
        &self,
        id: &str,
        kind: ScenarioDataKind,
        name: &str,
        num_dates: usize,
        samples: usize,
    ) -> Result<Vec<Vec<f64>>, AggregationError> {
        let missing = || AggregationError::MissingScenarioData {
            netting_set: id.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
        };
        let data = self
            .scenario_data
            .filter(|data| data.has(kind, name))
            .ok_or_else(missing)?;
        (0..num_dates)
            .map(|j| {
                (0..samples)
                    .map(|k| data.get(j, k, kind, name).ok_or_else(missing))
                    .collect()
            })
            .collect()
    }
}
