//! Allocation of netting-set exposure to trades.
//!
//! Every policy except [`AllocationMethod::Marginal`] scales the netted
//! EPE/ENE of each (date, sample) by a per-trade share fixed from today's
//! values. Results go to the allocated slots of the trade cube only.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::AllocationMethod;
use crate::cube::{AllocatedSlots, ExposureCube, MeasureSlot, ValuationCube};
use crate::error::AggregationError;
use crate::portfolio::Portfolio;
use crate::xva::XvaReport;

/// Today's value totals of a netting set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NettingSetValueTotals {
    /// Sum of trade values.
    pub net: f64,
    /// Sum of positive trade values.
    pub positive: f64,
    /// Sum of negative trade values (not positive).
    pub negative: f64,
}

impl NettingSetValueTotals {
    /// Adds one trade value.
    #[inline]
    pub fn add(&mut self, value: f64) {
        self.net += value;
        if value > 0.0 {
            self.positive += value;
        } else {
            self.negative += value;
        }
    }

    /// Totals of a set of trade values.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut totals = Self::default();
        for v in values {
            totals.add(v);
        }
        totals
    }
}

/// Read-only data an allocation sees.
#[derive(Clone, Copy)]
pub struct AllocationContext<'a> {
    /// Portfolio aligned with the trade cube.
    pub portfolio: &'a Portfolio,
    /// Simulated trade values.
    pub valuation: &'a ValuationCube,
    /// Netting-set exposure cube.
    pub netted: &'a ExposureCube,
    /// Today's netting-set totals by id.
    pub totals: &'a BTreeMap<String, NettingSetValueTotals>,
}

/// Marginal allocation strategy.
pub trait MarginalAllocator: Send + Sync {
    /// Fills the allocated slots for every trade, date and sample.
    fn allocate(
        &self,
        context: &AllocationContext<'_>,
        limit: f64,
        slots: &mut AllocatedSlots<'_>,
    ) -> Result<(), AggregationError>;
}

/// Path-wise marginal allocation of netted exposure.
///
/// On each path a trade receives the netted exposure in proportion to its
/// share of the netting-set value. When the netting-set value is smaller
/// than `limit` in absolute terms the exposure is split evenly.
/// A single-path netted cube is allocated with sample-mean values.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathwiseMarginalAllocator;

impl PathwiseMarginalAllocator {
    fn share(value: f64, total: f64, members: usize, limit: f64) -> f64 {
        if members == 1 {
            1.0
        } else if total.abs() < limit {
            1.0 / members as f64
        } else {
            value / total
        }
    }
}

impl MarginalAllocator for PathwiseMarginalAllocator {
    fn allocate(
        &self,
        context: &AllocationContext<'_>,
        limit: f64,
        slots: &mut AllocatedSlots<'_>,
    ) -> Result<(), AggregationError> {
        let trades = context.portfolio.trades();
        let netted = context.netted;
        let valuation = context.valuation;
        let samples = valuation.cube().samples();
        let pathwise = netted.samples() == samples;

        let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, trade) in trades.iter().enumerate() {
            let ns = trade.netting_set_id().as_str();
            let n = netted
                .index_of(ns)
                .ok_or_else(|| AggregationError::NettingSetNotFound(ns.to_string()))?;
            members.entry(n).or_default().push(i);
        }

        let epe = MeasureSlot::Epe.depth();
        let ene = MeasureSlot::Ene.depth();
        for (n, group) in members {
            let count = group.len();
            let total_t0: f64 = group.iter().map(|&i| valuation.t0_value(i)).sum();
            for &i in &group {
                let s = Self::share(valuation.t0_value(i), total_t0, count, limit);
                slots.set_t0(i, netted.get_t0(n, epe) * s, netted.get_t0(n, ene) * s);
            }

            for j in 0..netted.num_dates() {
                for k in 0..netted.samples() {
                    let value = |i: usize| {
                        if pathwise {
                            valuation.default_value(i, j, k)
                        } else {
                            (0..samples).map(|s| valuation.default_value(i, j, s)).sum::<f64>()
                                / samples as f64
                        }
                    };
                    let total: f64 = group.iter().map(|&i| value(i)).sum();
                    let (net_epe, net_ene) = (netted.get(n, j, k, epe), netted.get(n, j, k, ene));
                    for &i in &group {
                        let s = Self::share(value(i), total, count, limit);
                        slots.set(i, j, k, net_epe * s, net_ene * s);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Applies an [`AllocationMethod`] to a trade cube.
///
/// # Examples
///
/// ```
/// use xva_aggregation::allocation::NettingSetValueTotals;
///
/// let totals = NettingSetValueTotals::from_values([3.0, -1.0, 2.0]);
/// assert_eq!(totals.net, 4.0);
/// assert_eq!(totals.positive, 5.0);
/// assert_eq!(totals.negative, -1.0);
/// ```
pub struct AllocationEngine<'a> {
    method: AllocationMethod,
    context: AllocationContext<'a>,
    xva: Option<&'a XvaReport>,
    marginal: Option<(&'a dyn MarginalAllocator, f64)>,
}

impl<'a> AllocationEngine<'a> {
    /// Creates an engine for one allocation method.
    pub fn new(method: AllocationMethod, context: AllocationContext<'a>) -> Self {
        Self {
            method,
            context,
            xva: None,
            marginal: None,
        }
    }

    /// Standalone XVA used by [`AllocationMethod::RelativeXVA`].
    pub fn with_xva_report(mut self, report: &'a XvaReport) -> Self {
        self.xva = Some(report);
        self
    }

    /// Allocator and limit used by [`AllocationMethod::Marginal`].
    pub fn with_marginal_allocator(mut self, allocator: &'a dyn MarginalAllocator, limit: f64) -> Self {
        self.marginal = Some((allocator, limit));
        self
    }

    /// Writes allocated EPE/ENE for every trade, date and sample.
    ///
    /// # Errors
    ///
    /// - `DimensionMismatch` if trade and netted cubes differ in shape
    /// - `ZeroAllocationDenominator` if a share is undefined
    /// - `MarginalAllocatorMissing` for marginal allocation without allocator
    pub fn allocate(&self, slots: &mut AllocatedSlots<'_>) -> Result<(), AggregationError> {
        let netted = self.context.netted;
        let trade_cube = slots.cube();
        if trade_cube.samples() != netted.samples() {
            return Err(AggregationError::DimensionMismatch {
                what: "allocation samples".to_string(),
                expected: netted.samples(),
                actual: trade_cube.samples(),
            });
        }
        if trade_cube.num_dates() != netted.num_dates() {
            return Err(AggregationError::DimensionMismatch {
                what: "allocation dates".to_string(),
                expected: netted.num_dates(),
                actual: trade_cube.num_dates(),
            });
        }

        if self.method == AllocationMethod::Marginal {
            let (allocator, limit) = self.marginal.ok_or(AggregationError::MarginalAllocatorMissing)?;
            return allocator.allocate(&self.context, limit, slots);
        }

        let epe = MeasureSlot::Epe.depth();
        let ene = MeasureSlot::Ene.depth();
        for (i, trade) in self.context.portfolio.trades().iter().enumerate() {
            let ns = trade.netting_set_id().as_str();
            let n = netted
                .index_of(ns)
                .ok_or_else(|| AggregationError::NettingSetNotFound(ns.to_string()))?;
            let (epe_share, ene_share) = self.shares(trade.id().as_str(), ns, self.context.valuation.t0_value(i))?;

            slots.set_t0(i, netted.get_t0(n, epe) * epe_share, netted.get_t0(n, ene) * ene_share);
            for j in 0..netted.num_dates() {
                for k in 0..netted.samples() {
                    slots.set(
                        i,
                        j,
                        k,
                        netted.get(n, j, k, epe) * epe_share,
                        netted.get(n, j, k, ene) * ene_share,
                    );
                }
            }
        }
        debug!(method = %self.method, trades = self.context.portfolio.size(), "allocation complete");
        Ok(())
    }

    fn shares(&self, trade_id: &str, ns: &str, npv: f64) -> Result<(f64, f64), AggregationError> {
        let totals = || {
            self.context
                .totals
                .get(ns)
                .ok_or_else(|| AggregationError::NettingSetNotFound(ns.to_string()))
        };
        match self.method {
            AllocationMethod::None => Ok((0.0, 0.0)),
            AllocationMethod::RelativeFairValueGross => {
                let t = totals()?;
                if t.net == 0.0 {
                    return Err(AggregationError::zero_denominator(ns, "net value"));
                }
                if t.positive == 0.0 {
                    return Err(AggregationError::zero_denominator(ns, "positive value"));
                }
                let share = npv / t.positive;
                Ok((share, share))
            }
            AllocationMethod::RelativeFairValueNet => {
                let t = totals()?;
                if t.positive == 0.0 {
                    return Err(AggregationError::zero_denominator(ns, "positive value"));
                }
                if t.negative == 0.0 {
                    return Err(AggregationError::zero_denominator(ns, "negative value"));
                }
                Ok((npv.max(0.0) / t.positive, (-npv).max(0.0) / t.positive))
            }
            AllocationMethod::RelativeXVA => {
                let report = self
                    .xva
                    .ok_or_else(|| AggregationError::invalid_parameter("relative XVA allocation needs standalone XVA"))?;
                let trade_cva = report.trade_cva(trade_id)?;
                let sum_cva = report.netting_set_sum_cva(ns)?;
                let sum_dva = report.netting_set_sum_dva(ns)?;
                if trade_cva == 0.0 {
                    return Err(AggregationError::zero_denominator(ns, format!("CVA of trade {}", trade_id)));
                }
                if sum_cva == 0.0 {
                    return Err(AggregationError::zero_denominator(ns, "sum of trade CVA"));
                }
                if sum_dva == 0.0 {
                    return Err(AggregationError::zero_denominator(ns, "sum of trade DVA"));
                }
                Ok((npv / trade_cva / sum_cva, npv / trade_cva / sum_dva))
            }
            AllocationMethod::Marginal => Err(AggregationError::MarginalAllocatorMissing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::TRADE_CUBE_DEPTH;
    use crate::portfolio::{PortfolioBuilder, Trade};
    use crate::xva::XvaValues;
    use approx::assert_relative_eq;
    use xva_core::types::Date;

    struct Fixture {
        portfolio: Portfolio,
        valuation: ValuationCube,
        netted: ExposureCube,
        trade_cube: ExposureCube,
        totals: BTreeMap<String, NettingSetValueTotals>,
    }

    fn fixture(t0: [f64; 3]) -> Fixture {
        let today = Date::from_ymd(2024, 1, 2).unwrap();
        let dates = vec![
            Date::from_ymd(2024, 7, 2).unwrap(),
            Date::from_ymd(2025, 1, 2).unwrap(),
        ];
        let ids: Vec<String> = ["T1", "T2", "T3"].iter().map(|s| s.to_string()).collect();
        let portfolio = PortfolioBuilder::new()
            .add_trade(Trade::new("T1", "NS1", "CP1", dates[1]))
            .add_trade(Trade::new("T2", "NS1", "CP1", dates[1]))
            .add_trade(Trade::new("T3", "NS1", "CP1", dates[1]))
            .build()
            .unwrap();
        let mut npv = ExposureCube::new(ids.clone(), today, dates.clone(), 2, 1).unwrap();
        for (i, v) in t0.iter().enumerate() {
            npv.set_t0(i, 0, *v);
            for j in 0..2 {
                for k in 0..2 {
                    npv.set(i, j, k, 0, *v + k as f64);
                }
            }
        }
        let mut netted = ExposureCube::new(vec!["NS1".to_string()], today, dates.clone(), 2, 2).unwrap();
        netted.set_t0(0, 0, 5.0);
        netted.set_t0(0, 1, 1.0);
        for j in 0..2 {
            for k in 0..2 {
                netted.set(0, j, k, 0, 8.0 + j as f64);
                netted.set(0, j, k, 1, 2.0 + k as f64);
            }
        }
        let trade_cube = ExposureCube::new(ids, today, dates, 2, TRADE_CUBE_DEPTH).unwrap();
        let mut totals = BTreeMap::new();
        totals.insert("NS1".to_string(), NettingSetValueTotals::from_values(t0));
        Fixture {
            portfolio,
            valuation: ValuationCube::regular(npv),
            netted,
            trade_cube,
            totals,
        }
    }

    fn context(f: &Fixture) -> AllocationContext<'_> {
        AllocationContext {
            portfolio: &f.portfolio,
            valuation: &f.valuation,
            netted: &f.netted,
            totals: &f.totals,
        }
    }

    fn allocated(cube: &ExposureCube, i: usize, j: usize, k: usize) -> (f64, f64) {
        (
            cube.get(i, j, k, MeasureSlot::AllocatedEpe.depth()),
            cube.get(i, j, k, MeasureSlot::AllocatedEne.depth()),
        )
    }

    #[test]
    fn test_none_allocates_zero() {
        let mut f = fixture([3.0, -1.0, 2.0]);
        f.trade_cube.set(0, 0, 0, MeasureSlot::AllocatedEpe.depth(), 7.0);
        let mut trade_cube = f.trade_cube.clone();
        let mut slots = trade_cube.allocated_slots_mut().unwrap();
        AllocationEngine::new(AllocationMethod::None, context(&f))
            .allocate(&mut slots)
            .unwrap();
        assert_eq!(allocated(&trade_cube, 0, 0, 0), (0.0, 0.0));
    }

    #[test]
    fn test_relative_fair_value_gross_shares() {
        let f = fixture([3.0, -1.0, 2.0]);
        let mut trade_cube = f.trade_cube.clone();
        let mut slots = trade_cube.allocated_slots_mut().unwrap();
        AllocationEngine::new(AllocationMethod::RelativeFairValueGross, context(&f))
            .allocate(&mut slots)
            .unwrap();

        // positive total is 5
        assert_relative_eq!(allocated(&trade_cube, 0, 1, 1).0, 9.0 * 3.0 / 5.0);
        assert_relative_eq!(allocated(&trade_cube, 1, 1, 1).1, 3.0 * -1.0 / 5.0);
        assert_relative_eq!(
            trade_cube.get_t0(2, MeasureSlot::AllocatedEpe.depth()),
            5.0 * 2.0 / 5.0
        );
        let sum: f64 = (0..3).map(|i| allocated(&trade_cube, i, 0, 0).0).sum();
        assert_relative_eq!(sum, 8.0 * 4.0 / 5.0);
    }

    #[test]
    fn test_relative_fair_value_net_sums_back() {
        let f = fixture([3.0, -1.0, 2.0]);
        let mut trade_cube = f.trade_cube.clone();
        let mut slots = trade_cube.allocated_slots_mut().unwrap();
        AllocationEngine::new(AllocationMethod::RelativeFairValueNet, context(&f))
            .allocate(&mut slots)
            .unwrap();

        let epe_sum: f64 = (0..3).map(|i| allocated(&trade_cube, i, 1, 0).0).sum();
        assert_relative_eq!(epe_sum, 9.0, epsilon = 1e-12);
        assert_eq!(allocated(&trade_cube, 1, 0, 0).0, 0.0);
        assert_relative_eq!(allocated(&trade_cube, 1, 0, 1).1, 3.0 / 5.0);
        for i in 0..3 {
            assert!(allocated(&trade_cube, i, 0, 1).1 >= 0.0);
        }
    }

    #[test]
    fn test_zero_denominators() {
        let f = fixture([3.0, 1.0, 2.0]);
        let mut trade_cube = f.trade_cube.clone();
        let mut slots = trade_cube.allocated_slots_mut().unwrap();
        let result = AllocationEngine::new(AllocationMethod::RelativeFairValueNet, context(&f))
            .allocate(&mut slots);
        assert!(matches!(
            result,
            Err(AggregationError::ZeroAllocationDenominator { ref quantity, .. }) if quantity == "negative value"
        ));

        let f = fixture([1.0, -1.0, 0.0]);
        let mut trade_cube = f.trade_cube.clone();
        let mut slots = trade_cube.allocated_slots_mut().unwrap();
        let result = AllocationEngine::new(AllocationMethod::RelativeFairValueGross, context(&f))
            .allocate(&mut slots);
        assert!(matches!(result, Err(AggregationError::ZeroAllocationDenominator { .. })));
    }

    #[test]
    fn test_marginal_requires_allocator() {
        let f = fixture([3.0, -1.0, 2.0]);
        let mut trade_cube = f.trade_cube.clone();
        let mut slots = trade_cube.allocated_slots_mut().unwrap();
        let result = AllocationEngine::new(AllocationMethod::Marginal, context(&f)).allocate(&mut slots);
        assert!(matches!(result, Err(AggregationError::MarginalAllocatorMissing)));
    }

    #[test]
    fn test_pathwise_marginal_sums_back() {
        let f = fixture([3.0, -1.0, 2.0]);
        let mut trade_cube = f.trade_cube.clone();
        let mut slots = trade_cube.allocated_slots_mut().unwrap();
        AllocationEngine::new(AllocationMethod::Marginal, context(&f))
            .with_marginal_allocator(&PathwiseMarginalAllocator, 1.0)
            .allocate(&mut slots)
            .unwrap();

        // sample 1 values are 4, 0, 3
        assert_relative_eq!(allocated(&trade_cube, 0, 0, 1).0, 8.0 * 4.0 / 7.0);
        assert_eq!(allocated(&trade_cube, 1, 0, 1).0, 0.0);
        let sum: f64 = (0..3).map(|i| allocated(&trade_cube, i, 1, 1).1).sum();
        assert_relative_eq!(sum, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_relative_xva() {
        let f = fixture([3.0, -1.0, 2.0]);
        let mut report = XvaReport::new();
        for (id, cva, dva) in [("T1", 2.0, 1.0), ("T2", 1.0, 1.0), ("T3", 1.0, 2.0)] {
            report.insert_trade(id, "NS1", XvaValues { cva, dva, ..XvaValues::default() });
        }
        let mut trade_cube = f.trade_cube.clone();
        let mut slots = trade_cube.allocated_slots_mut().unwrap();
        AllocationEngine::new(AllocationMethod::RelativeXVA, context(&f))
            .with_xva_report(&report)
            .allocate(&mut slots)
            .unwrap();
        assert_relative_eq!(allocated(&trade_cube, 0, 0, 0).0, 8.0 * 3.0 / 2.0 / 4.0);
        assert_relative_eq!(allocated(&trade_cube, 0, 0, 0).1, 2.0 * 3.0 / 2.0 / 4.0);
    }

    #[test]
    fn test_sample_mismatch() {
        let f = fixture([3.0, -1.0, 2.0]);
        let mut trade_cube = ExposureCube::new(
            f.trade_cube.ids().to_vec(),
            f.trade_cube.asof(),
            f.trade_cube.dates().to_vec(),
            1,
            TRADE_CUBE_DEPTH,
        )
        .unwrap();
        let mut slots = trade_cube.allocated_slots_mut().unwrap();
        let result = AllocationEngine::new(AllocationMethod::None, context(&f)).allocate(&mut slots);
        assert!(matches!(result, Err(AggregationError::DimensionMismatch { .. })));
    }
}
