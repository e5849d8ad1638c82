//! XVA on top of exposure profiles.
//!
//! The [`XvaCalculator`] seam is run twice by the post-processor: once on
//! standalone trade exposure and once on allocated trade exposure, chosen
//! by [`ExposureSlots`]. Netting-set values always read the netted cube.
//!
//! [`StaticCreditXvaCalculator`] uses today's default curves:
//!
//! - CVA/DVA (`cva`): default-probability weighted EPE/ENE
//! - FCA/FBA/MVA (`fva`): spread-weighted EPE/ENE/expected IM

mod cva;
mod fva;

pub use cva::compute_cva;
pub use fva::{compute_fba, compute_fca, compute_funding_cost, compute_mva};

use std::collections::{BTreeSet, HashMap};

use rayon::prelude::*;
use tracing::{debug, warn};
use xva_core::types::{Date, DayCountConvention};

use crate::config::AggregationConfig;
use crate::cube::{ExposureCube, ExposureSlots, MeasureSlot};
use crate::error::AggregationError;
use crate::margin::DynamicInitialMargin;
use crate::market::Market;
use crate::portfolio::{NettingSetManager, Portfolio};

/// Adjustments of one trade or netting set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct XvaValues {
    /// Credit valuation adjustment.
    pub cva: f64,
    /// Debit valuation adjustment.
    pub dva: f64,
    /// Funding cost adjustment.
    pub fca: f64,
    /// Funding benefit adjustment.
    pub fba: f64,
    /// Margin valuation adjustment (netting sets only).
    pub mva: f64,
}

/// XVA results per trade and netting set.
#[derive(Debug, Clone, Default)]
pub struct XvaReport {
    trades: HashMap<String, XvaValues>,
    netting_sets: HashMap<String, XvaValues>,
    sum_cva: HashMap<String, f64>,
    sum_dva: HashMap<String, f64>,
}

impl XvaReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a trade and adds its CVA/DVA to its netting-set sums.
    pub fn insert_trade(&mut self, trade_id: &str, netting_set_id: &str, values: XvaValues) {
        *self.sum_cva.entry(netting_set_id.to_string()).or_default() += values.cva;
        *self.sum_dva.entry(netting_set_id.to_string()).or_default() += values.dva;
        self.trades.insert(trade_id.to_string(), values);
    }

    /// Records a netting set.
    pub fn insert_netting_set(&mut self, netting_set_id: &str, values: XvaValues) {
        self.sum_cva.entry(netting_set_id.to_string()).or_default();
        self.sum_dva.entry(netting_set_id.to_string()).or_default();
        self.netting_sets.insert(netting_set_id.to_string(), values);
    }

    /// Values of a trade.
    pub fn trade(&self, trade_id: &str) -> Result<&XvaValues, AggregationError> {
        self.trades
            .get(trade_id)
            .ok_or_else(|| AggregationError::TradeNotFound(trade_id.to_string()))
    }

    /// Values of a netting set.
    pub fn netting_set(&self, netting_set_id: &str) -> Result<&XvaValues, AggregationError> {
        self.netting_sets
            .get(netting_set_id)
            .ok_or_else(|| AggregationError::NettingSetNotFound(netting_set_id.to_string()))
    }

    /// Trade CVA.
    pub fn trade_cva(&self, trade_id: &str) -> Result<f64, AggregationError> {
        Ok(self.trade(trade_id)?.cva)
    }

    /// Trade DVA.
    pub fn trade_dva(&self, trade_id: &str) -> Result<f64, AggregationError> {
        Ok(self.trade(trade_id)?.dva)
    }

    /// Trade FCA.
    pub fn trade_fca(&self, trade_id: &str) -> Result<f64, AggregationError> {
        Ok(self.trade(trade_id)?.fca)
    }

    /// Trade FBA.
    pub fn trade_fba(&self, trade_id: &str) -> Result<f64, AggregationError> {
        Ok(self.trade(trade_id)?.fba)
    }

    /// Netting-set CVA.
    pub fn netting_set_cva(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        Ok(self.netting_set(netting_set_id)?.cva)
    }

    /// Netting-set DVA.
    pub fn netting_set_dva(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        Ok(self.netting_set(netting_set_id)?.dva)
    }

    /// Netting-set FCA.
    pub fn netting_set_fca(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        Ok(self.netting_set(netting_set_id)?.fca)
    }

    /// Netting-set FBA.
    pub fn netting_set_fba(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        Ok(self.netting_set(netting_set_id)?.fba)
    }

    /// Netting-set MVA.
    pub fn netting_set_mva(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        Ok(self.netting_set(netting_set_id)?.mva)
    }

    /// Sum of trade CVAs in a netting set.
    pub fn netting_set_sum_cva(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        self.sum_cva
            .get(netting_set_id)
            .copied()
            .ok_or_else(|| AggregationError::NettingSetNotFound(netting_set_id.to_string()))
    }

    /// Sum of trade DVAs in a netting set.
    pub fn netting_set_sum_dva(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        self.sum_dva
            .get(netting_set_id)
            .copied()
            .ok_or_else(|| AggregationError::NettingSetNotFound(netting_set_id.to_string()))
    }
}

/// Everything an XVA calculator reads.
#[derive(Clone, Copy)]
pub struct XvaInputs<'a> {
    /// Portfolio aligned with the trade cube.
    pub portfolio: &'a Portfolio,
    /// Netting set definitions.
    pub netting_sets: &'a NettingSetManager,
    /// Market as of today.
    pub market: &'a dyn Market,
    /// Run configuration.
    pub config: &'a AggregationConfig,
    /// Trade exposure cube.
    pub trade_cube: &'a ExposureCube,
    /// Netting-set exposure cube.
    pub netting_cube: &'a ExposureCube,
    /// Initial margin, when MVA is requested.
    pub initial_margin: Option<&'a dyn DynamicInitialMargin>,
    /// Trade cube slots read as EPE and ENE.
    pub trade_slots: ExposureSlots,
}

/// Computes CVA, DVA, FVA and MVA from exposure cubes.
pub trait XvaCalculator: Send + Sync {
    /// Builds the report.
    fn calculate(&self, inputs: &XvaInputs<'_>) -> Result<XvaReport, AggregationError>;
}

/// XVA with deterministic survival from today's default curves.
///
/// # Examples
///
/// ```
/// use xva_aggregation::xva::{StaticCreditXvaCalculator, XvaCalculator};
///
/// let calculator = StaticCreditXvaCalculator;
/// let _: &dyn XvaCalculator = &calculator;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCreditXvaCalculator;

struct CreditProfile {
    survival: Vec<f64>,
    lgd: f64,
}

impl CreditProfile {
    fn riskless(size: usize) -> Self {
        Self {
            survival: vec![1.0; size],
            lgd: 0.0,
        }
    }
}

fn credit_profile(
    market: &dyn Market,
    name: &str,
    times: &[f64],
) -> Result<Option<CreditProfile>, AggregationError> {
    let Some(curve) = market.default_curve(name) else {
        return Ok(None);
    };
    let recovery = market.recovery_rate(name).unwrap_or(0.0);
    let survival = times
        .iter()
        .map(|&t| curve.survival_probability(t))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(CreditProfile {
        survival,
        lgd: 1.0 - recovery,
    }))
}

fn accruals(asof: Date, dates: &[Date]) -> Vec<f64> {
    let dc = DayCountConvention::ActualActualIsda;
    std::iter::once(asof)
        .chain(dates.iter().copied())
        .collect::<Vec<_>>()
        .windows(2)
        .map(|w| dc.year_fraction(w[0], w[1]))
        .collect()
}

fn xva_values(
    epe: &[f64],
    ene: &[f64],
    accruals: &[f64],
    counterparty: &CreditProfile,
    own: &CreditProfile,
    config: &AggregationConfig,
) -> Result<XvaValues, AggregationError> {
    let (fca, fba) = if config.analytics.fva {
        (
            compute_fca(epe, accruals, &counterparty.survival, &own.survival, config.funding.borrowing_spread)?,
            compute_fba(ene, accruals, &counterparty.survival, &own.survival, config.funding.lending_spread)?,
        )
    } else {
        (0.0, 0.0)
    };
    Ok(XvaValues {
        cva: compute_cva(epe, &counterparty.survival, counterparty.lgd)?,
        dva: compute_cva(ene, &own.survival, own.lgd)?,
        fca,
        fba,
        mva: 0.0,
    })
}

/// MVA of one netting set. An empty expected-IM profile means no margin.
fn netting_set_mva(
    im: &dyn DynamicInitialMargin,
    netting_set_id: &str,
    accruals: &[f64],
    counterparty: &CreditProfile,
    own: &CreditProfile,
    config: &AggregationConfig,
) -> Result<f64, AggregationError> {
    let expected_im = im.expected_im(netting_set_id);
    if expected_im.is_empty() {
        return Ok(0.0);
    }
    if expected_im.len() != accruals.len() {
        return Err(AggregationError::DimensionMismatch {
            what: format!("expected initial margin of {}", netting_set_id),
            expected: accruals.len(),
            actual: expected_im.len(),
        });
    }
    compute_mva(
        &expected_im,
        accruals,
        &counterparty.survival,
        &own.survival,
        config.funding.borrowing_spread,
    )
}

impl XvaCalculator for StaticCreditXvaCalculator {
    fn calculate(&self, inputs: &XvaInputs<'_>) -> Result<XvaReport, AggregationError> {
        let market = inputs.market;
        let asof = inputs.trade_cube.asof();
        let dates = inputs.trade_cube.dates();
        let dc = DayCountConvention::ActualActualIsda;
        let times: Vec<f64> = std::iter::once(0.0)
            .chain(dates.iter().map(|&d| dc.year_fraction(asof, d)))
            .collect();
        let accruals = accruals(asof, dates);

        let own = match inputs.config.dva_name.as_deref() {
            Some(name) => credit_profile(market, name, &times)?.unwrap_or_else(|| {
                warn!(dva_name = name, "own default curve missing, DVA set to zero");
                CreditProfile::riskless(times.len())
            }),
            None => CreditProfile::riskless(times.len()),
        };

        let netting_set_counterparties = inputs
            .netting_cube
            .ids()
            .iter()
            .map(|id| {
                inputs
                    .netting_sets
                    .get(id)
                    .map(|definition| definition.counterparty_id().as_str())
                    .ok_or_else(|| AggregationError::NettingSetNotFound(id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let names: BTreeSet<&str> = inputs
            .portfolio
            .trades()
            .iter()
            .map(|t| t.counterparty_id().as_str())
            .chain(netting_set_counterparties.iter().copied())
            .collect();
        let mut counterparties = HashMap::with_capacity(names.len());
        for name in names {
            let profile = credit_profile(market, name, &times)?
                .ok_or_else(|| AggregationError::MissingDefaultCurve(name.to_string()))?;
            counterparties.insert(name, profile);
        }

        let slots = inputs.trade_slots;
        let trade_values = inputs
            .portfolio
            .trades()
            .par_iter()
            .enumerate()
            .map(|(i, trade)| {
                let epe = inputs.trade_cube.mean_over_samples(i, slots.epe.depth());
                let ene = inputs.trade_cube.mean_over_samples(i, slots.ene.depth());
                let counterparty = &counterparties[trade.counterparty_id().as_str()];
                xva_values(&epe, &ene, &accruals, counterparty, &own, inputs.config)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = XvaReport::new();
        for (trade, values) in inputs.portfolio.trades().iter().zip(trade_values) {
            report.insert_trade(trade.id().as_str(), trade.netting_set_id().as_str(), values);
        }

        for (n, (id, name)) in inputs
            .netting_cube
            .ids()
            .iter()
            .zip(&netting_set_counterparties)
            .enumerate()
        {
            let counterparty = &counterparties[name];
            let epe = inputs.netting_cube.mean_over_samples(n, MeasureSlot::Epe.depth());
            let ene = inputs.netting_cube.mean_over_samples(n, MeasureSlot::Ene.depth());
            let mut values = xva_values(&epe, &ene, &accruals, counterparty, &own, inputs.config)?;
            if inputs.config.analytics.mva {
                let im = inputs.initial_margin.ok_or_else(|| {
                    AggregationError::invalid_parameter("MVA enabled without an initial margin provider")
                })?;
                values.mva = netting_set_mva(im, id, &accruals, counterparty, &own, inputs.config)?;
            }
            debug!(netting_set = %id, cva = values.cva, dva = values.dva, "netting set xva");
            report.insert_netting_set(id, values);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::margin::StaticInitialMargin;
    use crate::market::SimpleMarket;
    use crate::portfolio::{NettingSetDefinition, PortfolioBuilder, Trade};
    use approx::assert_relative_eq;

    struct Fixture {
        portfolio: Portfolio,
        netting_sets: NettingSetManager,
        trade_cube: ExposureCube,
        netting_cube: ExposureCube,
        market: SimpleMarket,
    }

    fn fixture() -> Fixture {
        let today = Date::from_ymd(2024, 1, 2).unwrap();
        let dates = vec![
            Date::from_ymd(2025, 1, 2).unwrap(),
            Date::from_ymd(2026, 1, 2).unwrap(),
        ];
        let portfolio = PortfolioBuilder::new()
            .add_trade(Trade::new("T1", "NS1", "CP1", dates[1]))
            .add_trade(Trade::new("T2", "NS1", "CP1", dates[1]))
            .build()
            .unwrap();
        let mut netting_sets = NettingSetManager::new();
        netting_sets.add(NettingSetDefinition::new("NS1", "CP1")).unwrap();

        let mut trade_cube = ExposureCube::new(
            vec!["T1".to_string(), "T2".to_string()],
            today,
            dates.clone(),
            1,
            4,
        )
        .unwrap();
        let mut netting_cube =
            ExposureCube::new(vec!["NS1".to_string()], today, dates, 1, 2).unwrap();
        for j in 0..2 {
            trade_cube.set(0, j, 0, 0, 10.0);
            trade_cube.set(1, j, 0, 1, 4.0);
            trade_cube.set(0, j, 0, 2, 6.0);
            trade_cube.set(1, j, 0, 2, 0.0);
            netting_cube.set(0, j, 0, 0, 6.0);
        }
        let market = SimpleMarket::new(today, "EUR")
            .with_discount_rate("EUR", 0.0)
            .with_hazard_rate("CP1", 0.02, 0.4)
            .unwrap()
            .with_hazard_rate("BANK", 0.01, 0.5)
            .unwrap();
        Fixture {
            portfolio,
            netting_sets,
            trade_cube,
            netting_cube,
            market,
        }
    }

    fn inputs<'a>(f: &'a Fixture, config: &'a AggregationConfig, slots: ExposureSlots) -> XvaInputs<'a> {
        XvaInputs {
            portfolio: &f.portfolio,
            netting_sets: &f.netting_sets,
            market: &f.market,
            config,
            trade_cube: &f.trade_cube,
            netting_cube: &f.netting_cube,
            initial_margin: None,
            trade_slots: slots,
        }
    }

    #[test]
    fn test_cva_from_standalone_slots() {
        let f = fixture();
        let config = AggregationConfig::default();
        let report = StaticCreditXvaCalculator
            .calculate(&inputs(&f, &config, ExposureSlots::STANDALONE))
            .unwrap();

        let dc = DayCountConvention::ActualActualIsda;
        let t1 = dc.year_fraction(f.trade_cube.asof(), f.trade_cube.dates()[0]);
        let t2 = dc.year_fraction(f.trade_cube.asof(), f.trade_cube.dates()[1]);
        let s = |t: f64| (-0.02 * t).exp();
        let expected = 0.6 * 10.0 * ((1.0 - s(t1)) + (s(t1) - s(t2)));
        assert_relative_eq!(report.trade_cva("T1").unwrap(), expected, epsilon = 1e-12);
        assert_eq!(report.trade_cva("T2").unwrap(), 0.0);
        assert_relative_eq!(report.netting_set_sum_cva("NS1").unwrap(), expected, epsilon = 1e-12);
        assert_relative_eq!(report.netting_set_cva("NS1").unwrap(), 0.6 * expected, epsilon = 1e-12);
        // No own credit name configured.
        assert_eq!(report.trade_dva("T2").unwrap(), 0.0);
    }

    #[test]
    fn test_allocated_slots_and_dva() {
        let f = fixture();
        let config = AggregationConfig {
            dva_name: Some("BANK".to_string()),
            ..AggregationConfig::default()
        };
        let standalone = StaticCreditXvaCalculator
            .calculate(&inputs(&f, &config, ExposureSlots::STANDALONE))
            .unwrap();
        let allocated = StaticCreditXvaCalculator
            .calculate(&inputs(&f, &config, ExposureSlots::ALLOCATED))
            .unwrap();

        assert!(standalone.trade_dva("T2").unwrap() > 0.0);
        assert_eq!(allocated.trade_dva("T2").unwrap(), 0.0);
        assert_relative_eq!(
            allocated.trade_cva("T1").unwrap(),
            0.6 * standalone.trade_cva("T1").unwrap(),
            epsilon = 1e-12
        );
        assert_eq!(
            allocated.netting_set_cva("NS1").unwrap(),
            standalone.netting_set_cva("NS1").unwrap()
        );
    }

    #[test]
    fn test_missing_counterparty_curve() {
        let mut f = fixture();
        f.market = SimpleMarket::new(f.trade_cube.asof(), "EUR").with_discount_rate("EUR", 0.0);
        let config = AggregationConfig::default();
        let result = StaticCreditXvaCalculator.calculate(&inputs(&f, &config, ExposureSlots::STANDALONE));
        assert!(matches!(result, Err(AggregationError::MissingDefaultCurve(n)) if n == "CP1"));
    }

    #[test]
    fn test_fva_and_mva() {
        let f = fixture();
        let mut config = AggregationConfig::default();
        config.analytics.fva = true;
        config.analytics.mva = true;
        config.funding.borrowing_spread = 0.01;
        let im = StaticInitialMargin::new().with_margin("NS1", vec![vec![2.0], vec![2.0]]);
        let mut i = inputs(&f, &config, ExposureSlots::STANDALONE);
        i.initial_margin = Some(&im);
        let report = StaticCreditXvaCalculator.calculate(&i).unwrap();

        assert!(report.trade_fca("T1").unwrap() > 0.0);
        assert_eq!(report.trade_fba("T2").unwrap(), 0.0);
        let fca = report.netting_set_fca("NS1").unwrap();
        let mva = report.netting_set_mva("NS1").unwrap();
        assert_relative_eq!(mva, fca / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_expected_margin_profile_length() {
        let f = fixture();
        let mut config = AggregationConfig::default();
        config.analytics.mva = true;
        config.funding.borrowing_spread = 0.01;

        // Today in front: one entry too many for two dates.
        let with_today = StaticInitialMargin::new().with_margin("NS1", vec![vec![2.0]; 3]);
        let mut i = inputs(&f, &config, ExposureSlots::STANDALONE);
        i.initial_margin = Some(&with_today);
        let result = StaticCreditXvaCalculator.calculate(&i);
        assert!(matches!(
            result,
            Err(AggregationError::DimensionMismatch { expected: 2, actual: 3, .. })
        ));

        let no_margin = StaticInitialMargin::new();
        i.initial_margin = Some(&no_margin);
        let report = StaticCreditXvaCalculator.calculate(&i).unwrap();
        assert_eq!(report.netting_set_mva("NS1").unwrap(), 0.0);

        i.initial_margin = None;
        assert!(matches!(
            StaticCreditXvaCalculator.calculate(&i),
            Err(AggregationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_unused_netting_set_needs_no_curve() {
        let mut f = fixture();
        f.netting_sets.add(NettingSetDefinition::new("NS2", "CP9")).unwrap();
        let config = AggregationConfig::default();
        let report = StaticCreditXvaCalculator
            .calculate(&inputs(&f, &config, ExposureSlots::STANDALONE))
            .unwrap();
        assert!(report.netting_set_cva("NS1").unwrap() > 0.0);
        assert!(report.netting_set("NS2").is_err());
    }

    #[test]
    fn test_unknown_ids() {
        let report = XvaReport::new();
        assert!(matches!(report.trade_cva("X"), Err(AggregationError::TradeNotFound(_))));
        assert!(matches!(
            report.netting_set_sum_dva("X"),
            Err(AggregationError::NettingSetNotFound(_))
        ));
    }
}
