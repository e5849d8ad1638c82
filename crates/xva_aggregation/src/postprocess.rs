//! Post-processing of a valuation cube.
//!
//! [`PostProcessBuilder::build`] runs the stages in order:
//!
//! 1. Validate configuration and portfolio/cube alignment
//! 2. Standalone trade exposure
//! 3. Netted exposure with collateral and initial margin
//! 4. Standalone XVA
//! 5. Allocation of netted exposure to trades
//! 6. XVA on allocated exposure
//! 7. KVA
//!
//! The resulting [`PostProcess`] owns every profile and cube and answers
//! queries by trade or netting-set id.

use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use crate::allocation::{AllocationContext, AllocationEngine, MarginalAllocator, NettingSetValueTotals};
use crate::collateral::CollateralPathProvider;
use crate::config::{AggregationConfig, AllocationMethod};
use crate::cube::{ExposureCube, ExposureSlots, MeasureSlot, ValuationCube};
use crate::error::AggregationError;
use crate::exposure::{NettedExposure, NettedExposureCalculator, TradeExposure, TradeExposureCalculator};
use crate::kva::{KvaResult, RegulatoryCapitalEngine};
use crate::margin::DynamicInitialMargin;
use crate::market::Market;
use crate::portfolio::{NettingSetManager, Portfolio};
use crate::scenario::ScenarioData;
use crate::xva::{StaticCreditXvaCalculator, XvaCalculator, XvaInputs, XvaReport};

/// Collects the inputs of a post-processing run.
pub struct PostProcessBuilder<'a> {
    portfolio: &'a Portfolio,
    netting_sets: &'a NettingSetManager,
    market: &'a dyn Market,
    cube: &'a ValuationCube,
    config: AggregationConfig,
    scenario_data: Option<&'a dyn ScenarioData>,
    collateral: Option<&'a dyn CollateralPathProvider>,
    initial_margin: Option<Box<dyn DynamicInitialMargin + 'a>>,
    marginal_allocator: Option<&'a dyn MarginalAllocator>,
    xva_calculator: Option<&'a dyn XvaCalculator>,
}

impl<'a> PostProcessBuilder<'a> {
    /// Starts a run over a portfolio and its valuation cube.
    pub fn new(
        portfolio: &'a Portfolio,
        netting_sets: &'a NettingSetManager,
        market: &'a dyn Market,
        cube: &'a ValuationCube,
        config: AggregationConfig,
    ) -> Self {
        Self {
            portfolio,
            netting_sets,
            market,
            cube,
            config,
            scenario_data: None,
            collateral: None,
            initial_margin: None,
            marginal_allocator: None,
            xva_calculator: None,
        }
    }

    /// Scenario series for collateral (FX spots, index fixings).
    pub fn with_scenario_data(mut self, scenario_data: &'a dyn ScenarioData) -> Self {
        self.scenario_data = Some(scenario_data);
        self
    }

    /// Collateral model for netting sets with an active CSA.
    pub fn with_collateral_provider(mut self, provider: &'a dyn CollateralPathProvider) -> Self {
        self.collateral = Some(provider);
        self
    }

    /// Dynamic initial margin, used when DIM or MVA is enabled.
    pub fn with_initial_margin(mut self, initial_margin: impl DynamicInitialMargin + 'a) -> Self {
        self.initial_margin = Some(Box::new(initial_margin));
        self
    }

    /// Allocator for [`AllocationMethod::Marginal`].
    pub fn with_marginal_allocator(mut self, allocator: &'a dyn MarginalAllocator) -> Self {
        self.marginal_allocator = Some(allocator);
        self
    }

    /// XVA calculator; defaults to [`StaticCreditXvaCalculator`].
    pub fn with_xva_calculator(mut self, calculator: &'a dyn XvaCalculator) -> Self {
        self.xva_calculator = Some(calculator);
        self
    }

    fn check_alignment(&self) -> Result<(), AggregationError> {
        let cube_ids = self.cube.cube().ids();
        if self.portfolio.size() != cube_ids.len() {
            return Err(AggregationError::CubeSizeMismatch {
                portfolio: self.portfolio.size(),
                cube: cube_ids.len(),
            });
        }
        for (index, (trade, cube_id)) in self.portfolio.trades().iter().zip(cube_ids).enumerate() {
            if trade.id().as_str() != cube_id {
                return Err(AggregationError::CubeOrderMismatch {
                    index,
                    portfolio: trade.id().to_string(),
                    cube: cube_id.clone(),
                });
            }
        }
        Ok(())
    }

    fn netting_set_totals(&self) -> Result<BTreeMap<String, NettingSetValueTotals>, AggregationError> {
        let mut totals: BTreeMap<String, NettingSetValueTotals> = BTreeMap::new();
        for (i, trade) in self.portfolio.trades().iter().enumerate() {
            let ns = trade.netting_set_id().as_str();
            let definition = self
                .netting_sets
                .get(ns)
                .ok_or_else(|| AggregationError::NettingSetNotFound(ns.to_string()))?;
            if definition.counterparty_id() != trade.counterparty_id() {
                warn!(
                    trade = %trade.id(),
                    netting_set = ns,
                    trade_counterparty = %trade.counterparty_id(),
                    netting_set_counterparty = %definition.counterparty_id(),
                    "counterparty mismatch between trade and netting set"
                );
            }
            totals
                .entry(ns.to_string())
                .or_default()
                .add(self.cube.t0_value(i));
        }
        Ok(totals)
    }

    /// Runs every stage.
    ///
    /// # Errors
    ///
    /// Any [`AggregationError`] raised by validation or a stage.
    pub fn build(mut self) -> Result<PostProcess, AggregationError> {
        self.config.validate()?;
        self.check_alignment()?;
        let totals = self.netting_set_totals()?;
        let config = &self.config;
        info!(
            trades = self.portfolio.size(),
            netting_sets = totals.len(),
            dates = self.cube.cube().num_dates(),
            samples = self.cube.cube().samples(),
            allocation = %config.allocation_method,
            "post-processing started"
        );

        if config.analytics.dim || config.analytics.mva {
            let im = self.initial_margin.as_mut().ok_or_else(|| {
                AggregationError::invalid_parameter("DIM/MVA enabled without an initial margin provider")
            })?;
            im.build()?;
        }
        let initial_margin = self.initial_margin.as_deref();

        let mut trade_exposure =
            TradeExposureCalculator::new(self.portfolio, self.cube, self.market, config).build()?;

        let mut netted_calculator = NettedExposureCalculator::new(
            self.portfolio,
            self.cube,
            self.netting_sets,
            self.market,
            trade_exposure.netting_set_values(),
            config,
        );
        if let Some(data) = self.scenario_data {
            netted_calculator = netted_calculator.with_scenario_data(data);
        }
        if let Some(provider) = self.collateral {
            netted_calculator = netted_calculator.with_collateral_provider(provider);
        }
        if let Some(im) = initial_margin {
            netted_calculator = netted_calculator.with_initial_margin(im);
        }
        let netted = netted_calculator.build()?;

        let default_calculator = StaticCreditXvaCalculator;
        let xva_calculator: &dyn XvaCalculator = match self.xva_calculator {
            Some(calculator) => calculator,
            None => &default_calculator,
        };
        let standalone = xva_calculator.calculate(&XvaInputs {
            portfolio: self.portfolio,
            netting_sets: self.netting_sets,
            market: self.market,
            config,
            trade_cube: trade_exposure.cube(),
            netting_cube: netted.cube(),
            initial_margin,
            trade_slots: ExposureSlots::STANDALONE,
        })?;

        let context = AllocationContext {
            portfolio: self.portfolio,
            valuation: self.cube,
            netted: netted.cube(),
            totals: &totals,
        };
        let mut engine = AllocationEngine::new(config.allocation_method, context).with_xva_report(&standalone);
        if let Some(allocator) = self.marginal_allocator {
            engine = engine.with_marginal_allocator(allocator, config.marginal_allocation_limit);
        }
        let mut slots = trade_exposure
            .allocated_slots_mut()
            .ok_or_else(|| AggregationError::invalid_parameter("trade cube has no allocated slots"))?;
        engine.allocate(&mut slots)?;

        let allocated = xva_calculator.calculate(&XvaInputs {
            portfolio: self.portfolio,
            netting_sets: self.netting_sets,
            market: self.market,
            config,
            trade_cube: trade_exposure.cube(),
            netting_cube: netted.cube(),
            initial_margin,
            trade_slots: ExposureSlots::ALLOCATED,
        })?;

        let kva = if config.analytics.kva {
            RegulatoryCapitalEngine::new(self.market, &config.kva, &config.base_currency, config.dva_name.as_deref())
                .calculate(&netted, self.netting_sets)?
        } else {
            let periods = netted.cube().num_dates();
            netted
                .ids()
                .iter()
                .map(|id| (id.clone(), KvaResult::zero(periods)))
                .collect()
        };

        let cube = trade_exposure.cube();
        let allocated_profiles: Vec<(Vec<f64>, Vec<f64>)> = (0..cube.num_ids())
            .map(|i| {
                let profile = |slot: MeasureSlot| {
                    let mut p = Vec::with_capacity(cube.num_dates() + 1);
                    p.push(cube.get_t0(i, slot.depth()));
                    p.extend(cube.mean_over_samples(i, slot.depth()));
                    p
                };
                (profile(MeasureSlot::AllocatedEpe), profile(MeasureSlot::AllocatedEne))
            })
            .collect();

        let counterparties: HashMap<String, String> = totals
            .keys()
            .filter_map(|id| {
                self.netting_sets
                    .get(id)
                    .map(|d| (id.clone(), d.counterparty_id().to_string()))
            })
            .collect();

        info!(netting_sets = netted.ids().len(), "post-processing complete");
        Ok(PostProcess {
            config: self.config.clone(),
            trade_exposure,
            netted,
            allocated_profiles,
            standalone,
            allocated,
            kva,
            totals,
            counterparties,
        })
    }
}

/// Results of a post-processing run.
#[derive(Debug)]
pub struct PostProcess {
    config: AggregationConfig,
    trade_exposure: TradeExposure,
    netted: NettedExposure,
    allocated_profiles: Vec<(Vec<f64>, Vec<f64>)>,
    standalone: XvaReport,
    allocated: XvaReport,
    kva: HashMap<String, KvaResult>,
    totals: BTreeMap<String, NettingSetValueTotals>,
    counterparties: HashMap<String, String>,
}

impl PostProcess {
    /// Trade ids in cube order.
    pub fn trade_ids(&self) -> &[String] {
        self.trade_exposure.cube().ids()
    }

    /// Netting-set ids, sorted.
    pub fn netting_set_ids(&self) -> &[String] {
        self.netted.ids()
    }

    /// Run configuration.
    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Allocation method applied.
    pub fn allocation_method(&self) -> AllocationMethod {
        self.config.allocation_method
    }

    /// PFE quantile.
    pub fn quantile(&self) -> f64 {
        self.config.quantile
    }

    /// Trade exposure cube (EPE, ENE, allocated EPE, allocated ENE).
    pub fn exposure_cube(&self) -> &ExposureCube {
        self.trade_exposure.cube()
    }

    /// Netting-set exposure cube (EPE, ENE).
    pub fn netted_exposure_cube(&self) -> &ExposureCube {
        self.netted.cube()
    }

    // Trade exposure

    /// Trade EPE, today first.
    pub fn trade_epe(&self, trade_id: &str) -> Result<&[f64], AggregationError> {
        Ok(self.trade_exposure.profile(trade_id)?.epe())
    }

    /// Trade ENE, today first.
    pub fn trade_ene(&self, trade_id: &str) -> Result<&[f64], AggregationError> {
        Ok(self.trade_exposure.profile(trade_id)?.ene())
    }

    /// Trade Basel EE.
    pub fn trade_ee_b(&self, trade_id: &str) -> Result<&[f64], AggregationError> {
        Ok(self.trade_exposure.profile(trade_id)?.ee_b())
    }

    /// Trade Basel EEE.
    pub fn trade_eee_b(&self, trade_id: &str) -> Result<&[f64], AggregationError> {
        Ok(self.trade_exposure.profile(trade_id)?.eee_b())
    }

    /// Trade PFE.
    pub fn trade_pfe(&self, trade_id: &str) -> Result<&[f64], AggregationError> {
        Ok(self.trade_exposure.profile(trade_id)?.pfe())
    }

    /// Trade one-year EPE_B.
    pub fn trade_epe_b(&self, trade_id: &str) -> Result<f64, AggregationError> {
        Ok(self.trade_exposure.profile(trade_id)?.epe_b())
    }

    /// Trade one-year EEPE_B.
    pub fn trade_eepe_b(&self, trade_id: &str) -> Result<f64, AggregationError> {
        Ok(self.trade_exposure.profile(trade_id)?.eepe_b())
    }

    fn allocated_profile(&self, trade_id: &str) -> Result<&(Vec<f64>, Vec<f64>), AggregationError> {
        self.trade_exposure
            .cube()
            .index_of(trade_id)
            .map(|i| &self.allocated_profiles[i])
            .ok_or_else(|| AggregationError::TradeNotFound(trade_id.to_string()))
    }

    /// Allocated trade EPE, today first.
    pub fn allocated_trade_epe(&self, trade_id: &str) -> Result<&[f64], AggregationError> {
        Ok(&self.allocated_profile(trade_id)?.0)
    }

    /// Allocated trade ENE, today first.
    pub fn allocated_trade_ene(&self, trade_id: &str) -> Result<&[f64], AggregationError> {
        Ok(&self.allocated_profile(trade_id)?.1)
    }

    // Netting-set exposure

    /// Netting-set EPE, today first.
    pub fn net_epe(&self, netting_set_id: &str) -> Result<&[f64], AggregationError> {
        self.netted.epe(netting_set_id)
    }

    /// Netting-set ENE, today first.
    pub fn net_ene(&self, netting_set_id: &str) -> Result<&[f64], AggregationError> {
        self.netted.ene(netting_set_id)
    }

    /// Netting-set Basel EE.
    pub fn net_ee_b(&self, netting_set_id: &str) -> Result<&[f64], AggregationError> {
        self.netted.ee_b(netting_set_id)
    }

    /// Netting-set Basel EEE.
    pub fn net_eee_b(&self, netting_set_id: &str) -> Result<&[f64], AggregationError> {
        self.netted.eee_b(netting_set_id)
    }

    /// Netting-set PFE.
    pub fn net_pfe(&self, netting_set_id: &str) -> Result<&[f64], AggregationError> {
        self.netted.pfe(netting_set_id)
    }

    /// Netting-set one-year EPE_B.
    pub fn net_epe_b(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        self.netted.epe_b(netting_set_id)
    }

    /// Netting-set one-year EEPE_B.
    pub fn net_eepe_b(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        self.netted.eepe_b(netting_set_id)
    }

    /// Mean collateral balance.
    pub fn expected_collateral(&self, netting_set_id: &str) -> Result<&[f64], AggregationError> {
        self.netted.expected_collateral(netting_set_id)
    }

    /// COLVA per date.
    pub fn colva_increments(&self, netting_set_id: &str) -> Result<&[f64], AggregationError> {
        self.netted.colva_increments(netting_set_id)
    }

    /// Collateral floor value per date.
    pub fn collateral_floor_increments(&self, netting_set_id: &str) -> Result<&[f64], AggregationError> {
        self.netted.collateral_floor_increments(netting_set_id)
    }

    /// Netting-set COLVA.
    pub fn netting_set_colva(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        self.netted.colva(netting_set_id)
    }

    /// Netting-set collateral floor value.
    pub fn netting_set_collateral_floor(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        self.netted.collateral_floor(netting_set_id)
    }

    /// Today's value totals of a netting set.
    pub fn netting_set_value_totals(&self, netting_set_id: &str) -> Result<&NettingSetValueTotals, AggregationError> {
        self.totals
            .get(netting_set_id)
            .ok_or_else(|| AggregationError::NettingSetNotFound(netting_set_id.to_string()))
    }

    /// Counterparty of a netting set.
    pub fn counterparty_id(&self, netting_set_id: &str) -> Result<&str, AggregationError> {
        self.counterparties
            .get(netting_set_id)
            .map(String::as_str)
            .ok_or_else(|| AggregationError::NettingSetNotFound(netting_set_id.to_string()))
    }

    // XVA

    /// Standalone XVA report.
    pub fn xva(&self) -> &XvaReport {
        &self.standalone
    }

    /// XVA report on allocated exposure.
    pub fn allocated_xva(&self) -> &XvaReport {
        &self.allocated
    }

    /// Standalone trade CVA.
    pub fn trade_cva(&self, trade_id: &str) -> Result<f64, AggregationError> {
        self.standalone.trade_cva(trade_id)
    }

    /// Standalone trade DVA.
    pub fn trade_dva(&self, trade_id: &str) -> Result<f64, AggregationError> {
        self.standalone.trade_dva(trade_id)
    }

    /// Standalone trade FBA.
    pub fn trade_fba(&self, trade_id: &str) -> Result<f64, AggregationError> {
        self.standalone.trade_fba(trade_id)
    }

    /// Standalone trade FCA.
    pub fn trade_fca(&self, trade_id: &str) -> Result<f64, AggregationError> {
        self.standalone.trade_fca(trade_id)
    }

    /// Allocated trade CVA.
    pub fn allocated_trade_cva(&self, trade_id: &str) -> Result<f64, AggregationError> {
        self.allocated.trade_cva(trade_id)
    }

    /// Allocated trade DVA.
    pub fn allocated_trade_dva(&self, trade_id: &str) -> Result<f64, AggregationError> {
        self.allocated.trade_dva(trade_id)
    }

    /// Netting-set CVA.
    pub fn netting_set_cva(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        self.standalone.netting_set_cva(netting_set_id)
    }

    /// Netting-set DVA.
    pub fn netting_set_dva(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        self.standalone.netting_set_dva(netting_set_id)
    }

    /// Netting-set FBA.
    pub fn netting_set_fba(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        self.standalone.netting_set_fba(netting_set_id)
    }

    /// Netting-set FCA.
    pub fn netting_set_fca(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        self.standalone.netting_set_fca(netting_set_id)
    }

    /// Netting-set MVA.
    pub fn netting_set_mva(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        self.standalone.netting_set_mva(netting_set_id)
    }

    // KVA

    /// KVA of a netting set with per-period increments.
    pub fn kva(&self, netting_set_id: &str) -> Result<&KvaResult, AggregationError> {
        self.kva
            .get(netting_set_id)
            .ok_or_else(|| AggregationError::NettingSetNotFound(netting_set_id.to_string()))
    }

    /// Our CCR capital cost.
    pub fn our_kva_ccr(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        Ok(self.kva(netting_set_id)?.our_kva_ccr())
    }

    /// Their CCR capital cost.
    pub fn their_kva_ccr(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        Ok(self.kva(netting_set_id)?.their_kva_ccr())
    }

    /// Our CVA capital cost.
    pub fn our_kva_cva(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        Ok(self.kva(netting_set_id)?.our_kva_cva())
    }

    /// Their CVA capital cost.
    pub fn their_kva_cva(&self, netting_set_id: &str) -> Result<f64, AggregationError> {
        Ok(self.kva(netting_set_id)?.their_kva_cva())
    }
}
