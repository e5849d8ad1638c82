//! # XVA Aggregation (L4: Application)
//!
//! Post-processing of a simulated NPV cube into counterparty exposure,
//! allocated exposure and regulatory capital cost.
//!
//! This crate provides:
//! - Dense exposure cubes with explicit measure slots
//! - Trade and netting-set exposure profiles (EPE, ENE, EE_B, EEE_B, PFE)
//! - Collateral-adjusted netting with COLVA and collateral floor costs
//! - Allocation of netting-set exposure back to trades
//! - Regulatory capital valuation adjustment (KVA, CCR and CVA capital)
//! - A static-credit CVA/DVA/FVA/MVA calculator
//! - The [`PostProcess`] orchestrator tying the stages together
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            xva_aggregation (L4)              │
//! ├──────────────────────────────────────────────┤
//! │  cube/        - ExposureCube, ValuationCube  │
//! │  portfolio/   - Trade, NettingSet, ids       │
//! │  exposure/    - trade and netted profiles    │
//! │  allocation   - exposure allocation          │
//! │  kva          - regulatory capital           │
//! │  xva/         - CVA, DVA, FVA, MVA           │
//! │  postprocess  - orchestration, accessors     │
//! └──────────────────────────────────────────────┘
//!          ↓
//! ┌──────────────────────────────────────────────┐
//! │               xva_core (L1)                  │
//! │  Dates, day counts, curves, normal CDF       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Performance
//!
//! Netting sets and trades are independent and processed with Rayon;
//! dates within one netting set are sequential because EEE_B is a running
//! maximum.
//!
//! ## Example
//!
//! ```
//! use xva_aggregation::cube::{ExposureCube, ValuationCube};
//! use xva_aggregation::market::SimpleMarket;
//! use xva_aggregation::portfolio::{NettingSetDefinition, NettingSetManager, PortfolioBuilder, Trade};
//! use xva_aggregation::{AggregationConfig, PostProcessBuilder};
//! use xva_core::types::Date;
//!
//! let today = Date::from_ymd(2024, 1, 2).unwrap();
//! let dates = vec![
//!     Date::from_ymd(2024, 7, 2).unwrap(),
//!     Date::from_ymd(2025, 1, 2).unwrap(),
//! ];
//!
//! let portfolio = PortfolioBuilder::new()
//!     .add_trade(Trade::new("T1", "NS1", "CP1", dates[1]))
//!     .build()
//!     .unwrap();
//!
//! let mut netting_sets = NettingSetManager::new();
//! netting_sets.add(NettingSetDefinition::new("NS1", "CP1")).unwrap();
//!
//! let mut npv = ExposureCube::new(vec!["T1".to_string()], today, dates, 2, 1).unwrap();
//! for (j, values) in [[10.0, -4.0], [6.0, 2.0]].iter().enumerate() {
//!     for (k, v) in values.iter().enumerate() {
//!         npv.set(0, j, k, 0, *v);
//!     }
//! }
//! let cube = ValuationCube::regular(npv);
//!
//! let market = SimpleMarket::new(today, "EUR")
//!     .with_discount_rate("EUR", 0.0)
//!     .with_hazard_rate("CP1", 0.01, 0.4)
//!     .unwrap();
//! let mut config = AggregationConfig::default();
//! config.analytics.kva = false;
//!
//! let post = PostProcessBuilder::new(&portfolio, &netting_sets, &market, &cube, config)
//!     .build()
//!     .unwrap();
//!
//! let epe = post.net_epe("NS1").unwrap();
//! assert_eq!(epe[1], 5.0);
//! assert_eq!(post.net_pfe("NS1").unwrap()[1], 10.0);
//! ```

#![warn(missing_docs)]

pub mod allocation;
pub mod collateral;
pub mod config;
pub mod cube;
pub mod error;
pub mod exposure;
pub mod kva;
pub mod margin;
pub mod market;
pub mod portfolio;
pub mod postprocess;
pub mod scenario;
pub mod xva;

// Re-export commonly used types
pub use allocation::{
    AllocationContext, AllocationEngine, MarginalAllocator, NettingSetValueTotals,
    PathwiseMarginalAllocator,
};
pub use config::{
    AggregationConfig, AllocationMethod, AnalyticsFlags, CollateralCalculationType, ConfigError,
    FundingParams, KvaParams,
};
pub use cube::{CubeInterpretation, ExposureCube, ExposureSlots, MeasureSlot, ValuationCube};
pub use error::AggregationError;
pub use exposure::{
    NettedExposure, NettedExposureCalculator, NettingSetProfile, TradeExposure,
    TradeExposureCalculator, TradeProfile,
};
pub use kva::{KvaResult, RegulatoryCapitalEngine};
pub use postprocess::{PostProcess, PostProcessBuilder};
pub use xva::{StaticCreditXvaCalculator, XvaCalculator, XvaReport};
