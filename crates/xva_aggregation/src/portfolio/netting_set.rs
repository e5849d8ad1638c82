//! Netting set definitions with collateral agreements.
//!
//! The registry stores definitions in an arena with a name→index lookup
//! built as definitions are added.

use std::collections::HashMap;

use super::error::PortfolioError;
use super::ids::{CounterpartyId, NettingSetId};

/// Credit Support Annex terms relevant to exposure aggregation.
///
/// Balances are driven by the threshold, minimum transfer amount and
/// independent amount; the currency, compounding index and spreads feed
/// the COLVA and collateral floor calculation.
///
/// # Examples
///
/// ```
/// use xva_aggregation::portfolio::CollateralAgreement;
///
/// let csa = CollateralAgreement::new("USD")
///     .with_index("USD-FedFunds")
///     .with_spreads(0.001, 0.002)
///     .with_threshold(1_000_000.0)
///     .unwrap();
///
/// assert!(csa.is_active());
/// assert_eq!(csa.spread_for_balance(5.0), 0.001);
/// assert_eq!(csa.spread_for_balance(-5.0), 0.002);
/// ```
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CollateralAgreement {
    active: bool,
    currency: String,
    index_name: Option<String>,
    spread_received: f64,
    spread_paid: f64,
    threshold: f64,
    mta: f64,
    independent_amount: f64,
}

impl CollateralAgreement {
    /// Creates an active, zero-threshold agreement in the given currency.
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            active: true,
            currency: currency.into(),
            index_name: None,
            spread_received: 0.0,
            spread_paid: 0.0,
            threshold: 0.0,
            mta: 0.0,
            independent_amount: 0.0,
        }
    }

    /// Marks the agreement active or inactive.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Sets the overnight index compounding the collateral balance.
    pub fn with_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Sets the spreads paid on received and posted collateral.
    pub fn with_spreads(mut self, received: f64, paid: f64) -> Self {
        self.spread_received = received;
        self.spread_paid = paid;
        self
    }

    /// Sets the threshold below which no collateral is called.
    ///
    /// # Errors
    ///
    /// Returns `PortfolioError::InvalidCollateralAgreement` for a negative threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Result<Self, PortfolioError> {
        if threshold < 0.0 {
            return Err(PortfolioError::InvalidCollateralAgreement(
                "Threshold must be non-negative".to_string(),
            ));
        }
        self.threshold = threshold;
        Ok(self)
    }

    /// Sets the minimum transfer amount.
    ///
    /// # Errors
    ///
    /// Returns `PortfolioError::InvalidCollateralAgreement` for a negative MTA.
    pub fn with_mta(mut self, mta: f64) -> Result<Self, PortfolioError> {
        if mta < 0.0 {
            return Err(PortfolioError::InvalidCollateralAgreement(
                "Minimum transfer amount must be non-negative".to_string(),
            ));
        }
        self.mta = mta;
        Ok(self)
    }

    /// Sets the independent amount (positive = held by us).
    pub fn with_independent_amount(mut self, amount: f64) -> Self {
        self.independent_amount = amount;
        self
    }

    /// True when the agreement is in force.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Collateral currency.
    #[inline]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Compounding index, if any.
    #[inline]
    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    /// Spread on collateral we hold.
    #[inline]
    pub fn spread_received(&self) -> f64 {
        self.spread_received
    }

    /// Spread on collateral we posted.
    #[inline]
    pub fn spread_paid(&self) -> f64 {
        self.spread_paid
    }

    /// Spread applicable to a balance: received when the balance is
    /// non-negative, paid otherwise.
    #[inline]
    pub fn spread_for_balance(&self, balance: f64) -> f64 {
        if balance >= 0.0 {
            self.spread_received
        } else {
            self.spread_paid
        }
    }

    /// Threshold amount.
    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Minimum transfer amount.
    #[inline]
    pub fn mta(&self) -> f64 {
        self.mta
    }

    /// Independent amount.
    #[inline]
    pub fn independent_amount(&self) -> f64 {
        self.independent_amount
    }
}

/// Netting set definition: counterparty and optional collateral agreement.
#[derive(Clone, Debug, PartialEq)]
pub struct NettingSetDefinition {
    id: NettingSetId,
    counterparty_id: CounterpartyId,
    csa: Option<CollateralAgreement>,
}

impl NettingSetDefinition {
    /// Creates an uncollateralised netting set.
    pub fn new(id: impl Into<NettingSetId>, counterparty_id: impl Into<CounterpartyId>) -> Self {
        Self {
            id: id.into(),
            counterparty_id: counterparty_id.into(),
            csa: None,
        }
    }

    /// Attaches a collateral agreement.
    pub fn with_csa(mut self, csa: CollateralAgreement) -> Self {
        self.csa = Some(csa);
        self
    }

    /// Netting set identifier.
    #[inline]
    pub fn id(&self) -> &NettingSetId {
        &self.id
    }

    /// Counterparty of the netting set.
    #[inline]
    pub fn counterparty_id(&self) -> &CounterpartyId {
        &self.counterparty_id
    }

    /// Collateral agreement, active or not.
    #[inline]
    pub fn csa(&self) -> Option<&CollateralAgreement> {
        self.csa.as_ref()
    }

    /// Collateral agreement if it is in force.
    #[inline]
    pub fn active_csa(&self) -> Option<&CollateralAgreement> {
        self.csa.as_ref().filter(|csa| csa.is_active())
    }
}

/// Registry of netting-set definitions.
#[derive(Debug, Default, Clone)]
pub struct NettingSetManager {
    definitions: Vec<NettingSetDefinition>,
    index: HashMap<NettingSetId, usize>,
}

impl NettingSetManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition.
    ///
    /// # Errors
    ///
    /// Returns `PortfolioError::DuplicateNettingSet` if the id is taken.
    pub fn add(&mut self, definition: NettingSetDefinition) -> Result<usize, PortfolioError> {
        if self.index.contains_key(definition.id().as_str()) {
            return Err(PortfolioError::DuplicateNettingSet(
                definition.id().to_string(),
            ));
        }
        let slot = self.definitions.len();
        self.index.insert(definition.id().clone(), slot);
        self.definitions.push(definition);
        Ok(slot)
    }

    /// True when the id is registered.
    #[inline]
    pub fn has(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Definition by id.
    #[inline]
    pub fn get(&self, id: &str) -> Option<&NettingSetDefinition> {
        self.index.get(id).map(|&i| &self.definitions[i])
    }

    /// Number of definitions.
    #[inline]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// True when empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// All definitions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &NettingSetDefinition> {
        self.definitions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_csa_is_not_reported_active() {
        let ns = NettingSetDefinition::new("NS1", "CP1")
            .with_csa(CollateralAgreement::new("EUR").with_active(false));
        assert!(ns.csa().is_some());
        assert!(ns.active_csa().is_none());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        assert!(CollateralAgreement::new("EUR").with_threshold(-1.0).is_err());
        assert!(CollateralAgreement::new("EUR").with_mta(-1.0).is_err());
    }

    #[test]
    fn test_zero_balance_uses_received_spread() {
        let csa = CollateralAgreement::new("EUR").with_spreads(0.01, 0.02);
        assert_eq!(csa.spread_for_balance(0.0), 0.01);
    }

    #[test]
    fn test_manager_lookup_and_duplicates() {
        let mut manager = NettingSetManager::new();
        assert_eq!(manager.add(NettingSetDefinition::new("NS1", "CP1")).unwrap(), 0);
        assert_eq!(manager.add(NettingSetDefinition::new("NS2", "CP2")).unwrap(), 1);
        assert!(manager.has("NS2"));
        assert_eq!(
            manager.get("NS2").map(|ns| ns.counterparty_id().as_str()),
            Some("CP2")
        );
        assert!(manager.get("NS3").is_none());
        assert_eq!(
            manager.add(NettingSetDefinition::new("NS1", "CP9")),
            Err(PortfolioError::DuplicateNettingSet("NS1".to_string()))
        );
        assert_eq!(manager.len(), 2);
    }
}
