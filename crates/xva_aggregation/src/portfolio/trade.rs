//! Trade envelopes and the ordered portfolio.

use std::collections::HashMap;

use xva_core::types::Date;

use super::error::PortfolioError;
use super::ids::{CounterpartyId, NettingSetId, TradeId};

/// Aggregation view of a trade: identity, netting set, counterparty and
/// maturity. Valuation happens upstream.
#[derive(Clone, Debug, PartialEq)]
pub struct Trade {
    id: TradeId,
    netting_set_id: NettingSetId,
    counterparty_id: CounterpartyId,
    maturity: Date,
}

impl Trade {
    /// Creates a trade envelope.
    pub fn new(
        id: impl Into<TradeId>,
        netting_set_id: impl Into<NettingSetId>,
        counterparty_id: impl Into<CounterpartyId>,
        maturity: Date,
    ) -> Self {
        Self {
            id: id.into(),
            netting_set_id: netting_set_id.into(),
            counterparty_id: counterparty_id.into(),
            maturity,
        }
    }

    /// Returns the trade identifier.
    #[inline]
    pub fn id(&self) -> &TradeId {
        &self.id
    }

    /// Returns the netting set the trade belongs to.
    #[inline]
    pub fn netting_set_id(&self) -> &NettingSetId {
        &self.netting_set_id
    }

    /// Returns the counterparty stated on the trade.
    #[inline]
    pub fn counterparty_id(&self) -> &CounterpartyId {
        &self.counterparty_id
    }

    /// Returns the trade maturity.
    #[inline]
    pub fn maturity(&self) -> Date {
        self.maturity
    }
}

/// Trades in valuation cube order with an id lookup.
#[derive(Debug, Clone)]
pub struct Portfolio {
    trades: Vec<Trade>,
    index: HashMap<TradeId, usize>,
}

impl Portfolio {
    /// Number of trades.
    #[inline]
    pub fn size(&self) -> usize {
        self.trades.len()
    }

    /// True when the portfolio holds no trades.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Trades in insertion order.
    #[inline]
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Trade ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &TradeId> {
        self.trades.iter().map(Trade::id)
    }

    /// Position of a trade in the portfolio.
    #[inline]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Trade by id.
    #[inline]
    pub fn trade(&self, id: &str) -> Option<&Trade> {
        self.index_of(id).map(|i| &self.trades[i])
    }
}

/// Builder for [`Portfolio`]; keeps insertion order and rejects duplicates.
///
/// # Examples
///
/// ```
/// use xva_aggregation::portfolio::{PortfolioBuilder, Trade};
/// use xva_core::types::Date;
///
/// let maturity = Date::from_ymd(2030, 6, 30).unwrap();
/// let portfolio = PortfolioBuilder::new()
///     .add_trade(Trade::new("T1", "NS1", "CP1", maturity))
///     .add_trade(Trade::new("T2", "NS1", "CP1", maturity))
///     .build()
///     .unwrap();
///
/// assert_eq!(portfolio.size(), 2);
/// assert_eq!(portfolio.index_of("T2"), Some(1));
/// ```
#[derive(Debug, Default)]
pub struct PortfolioBuilder {
    trades: Vec<Trade>,
}

impl PortfolioBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a trade.
    pub fn add_trade(mut self, trade: Trade) -> Self {
        self.trades.push(trade);
        self
    }

    /// Appends several trades.
    pub fn add_trades(mut self, trades: impl IntoIterator<Item = Trade>) -> Self {
        self.trades.extend(trades);
        self
    }

    /// Builds the portfolio.
    ///
    /// # Errors
    ///
    /// - `PortfolioError::EmptyPortfolio` when no trade was added
    /// - `PortfolioError::DuplicateTrade` when an id repeats
    pub fn build(self) -> Result<Portfolio, PortfolioError> {
        if self.trades.is_empty() {
            return Err(PortfolioError::EmptyPortfolio);
        }
        let mut index = HashMap::with_capacity(self.trades.len());
        for (i, trade) in self.trades.iter().enumerate() {
            if index.insert(trade.id().clone(), i).is_some() {
                return Err(PortfolioError::DuplicateTrade(trade.id().to_string()));
            }
        }
        Ok(Portfolio {
            trades: self.trades,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maturity() -> Date {
        Date::from_ymd(2029, 12, 31).unwrap()
    }

    #[test]
    fn test_trade_accessors() {
        let trade = Trade::new("T1", "NS1", "CP1", maturity());
        assert_eq!(trade.id().as_str(), "T1");
        assert_eq!(trade.netting_set_id().as_str(), "NS1");
        assert_eq!(trade.counterparty_id().as_str(), "CP1");
        assert_eq!(trade.maturity(), maturity());
    }

    #[test]
    fn test_builder_preserves_order() {
        let portfolio = PortfolioBuilder::new()
            .add_trades(["B", "A", "C"].map(|id| Trade::new(id, "NS", "CP", maturity())))
            .build()
            .unwrap();
        let ids: Vec<&str> = portfolio.ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
        assert!(portfolio.trade("A").is_some());
        assert!(portfolio.trade("Z").is_none());
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let result = PortfolioBuilder::new()
            .add_trade(Trade::new("T1", "NS", "CP", maturity()))
            .add_trade(Trade::new("T1", "NS", "CP", maturity()))
            .build();
        assert_eq!(
            result.unwrap_err(),
            PortfolioError::DuplicateTrade("T1".to_string())
        );
    }

    #[test]
    fn test_builder_rejects_empty() {
        assert_eq!(
            PortfolioBuilder::new().build().unwrap_err(),
            PortfolioError::EmptyPortfolio
        );
    }
}
