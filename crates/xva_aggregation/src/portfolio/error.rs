//! Portfolio error types.

use thiserror::Error;

/// Errors raised while assembling a portfolio or netting-set registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortfolioError {
    /// Trade id appears twice.
    #[error("Duplicate trade ID: {0}")]
    DuplicateTrade(String),

    /// Netting set id appears twice.
    #[error("Duplicate netting set ID: {0}")]
    DuplicateNettingSet(String),

    /// Collateral agreement terms are inconsistent.
    #[error("Invalid collateral agreement: {0}")]
    InvalidCollateralAgreement(String),

    /// Portfolio has no trades.
    #[error("Portfolio is empty")]
    EmptyPortfolio,
}
