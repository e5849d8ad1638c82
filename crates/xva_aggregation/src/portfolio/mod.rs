//! Portfolio structure: trade envelopes and netting-set definitions.
//!
//! Trades only carry what aggregation needs (ids and maturity); their
//! simulated values live in the [`ValuationCube`](crate::cube::ValuationCube).

mod error;
mod ids;
mod netting_set;
mod trade;

pub use error::PortfolioError;
pub use ids::{CounterpartyId, NettingSetId, TradeId};
pub use netting_set::{CollateralAgreement, NettingSetDefinition, NettingSetManager};
pub use trade::{Portfolio, PortfolioBuilder, Trade};
