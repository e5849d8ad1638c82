//! Error types for the aggregation run.
//!
//! Every variant is a precondition violation: mismatched inputs, missing
//! simulation data or undefined allocation ratios. None of them is retryable.

use thiserror::Error;
use xva_core::market_data::MarketDataError;
use xva_core::types::DateError;

use crate::config::ConfigError;
use crate::portfolio::PortfolioError;

/// Fatal errors raised while building or querying post-processing results.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// Portfolio and cube disagree on the number of trades.
    #[error("Portfolio size ({portfolio}) does not match cube trade count ({cube})")]
    CubeSizeMismatch {
        /// Number of trades in the portfolio
        portfolio: usize,
        /// Number of ids in the cube
        cube: usize,
    },

    /// Portfolio and cube trade ids are not in the same order.
    #[error("Portfolio trade {portfolio} at position {index} does not match cube id {cube}")]
    CubeOrderMismatch {
        /// Position of the first mismatch
        index: usize,
        /// Trade id in the portfolio
        portfolio: String,
        /// Id in the cube
        cube: String,
    },

    /// Input array has an unexpected length.
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Description of the array
        what: String,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Unknown netting set id.
    #[error("Netting set not found: {0}")]
    NettingSetNotFound(String),

    /// Unknown trade id.
    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    /// A scenario series required by an active collateral agreement is absent.
    #[error("Scenario data does not provide {kind} for {name} (netting set {netting_set})")]
    MissingScenarioData {
        /// Netting set requiring the series
        netting_set: String,
        /// Series type
        kind: String,
        /// Series name
        name: String,
    },

    /// Dynamic initial margin provider returned a negative amount.
    #[error("Negative DIM {value} for netting set {netting_set}, date {date}, sample {sample}")]
    NegativeInitialMargin {
        /// Netting set id
        netting_set: String,
        /// Date index
        date: usize,
        /// Sample index
        sample: usize,
        /// Offending margin amount
        value: f64,
    },

    /// Allocation ratio would divide by zero.
    #[error("Cannot allocate netting set {netting_set}: {quantity} is zero")]
    ZeroAllocationDenominator {
        /// Netting set id
        netting_set: String,
        /// Name of the vanishing denominator
        quantity: String,
    },

    /// Marginal allocation requested without a marginal allocator.
    #[error("Marginal allocation requested but no marginal allocator was supplied")]
    MarginalAllocatorMissing,

    /// Counterparty default curve not available in the market.
    #[error("Default curve missing for {0}")]
    MissingDefaultCurve(String),

    /// Discount curve not available in the market.
    #[error("Discount curve missing for currency {0}")]
    MissingDiscountCurve(String),

    /// Invalid numerical parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from curve lookups.
    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),

    /// Error from date arithmetic.
    #[error("Date error: {0}")]
    Date(#[from] DateError),

    /// Error from portfolio construction.
    #[error("Portfolio error: {0}")]
    Portfolio(#[from] PortfolioError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AggregationError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a zero-denominator allocation error
    pub fn zero_denominator(netting_set: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self::ZeroAllocationDenominator {
            netting_set: netting_set.into(),
            quantity: quantity.into(),
        }
    }
}
