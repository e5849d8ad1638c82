//! Dynamic initial margin.
//!
//! Initial margin posted by the counterparty reduces our exposure and
//! margin we post reduces theirs; both sides are assumed symmetric.

use std::collections::HashMap;

use crate::error::AggregationError;

/// Source of simulated initial margin per netting set.
pub trait DynamicInitialMargin: Send + Sync {
    /// Prepares margin paths. Called once before exposure is computed.
    fn build(&mut self) -> Result<(), AggregationError> {
        Ok(())
    }

    /// Initial margin at (date index, sample).
    fn dynamic_im(&self, netting_set: &str, date: usize, sample: usize) -> Result<f64, AggregationError>;

    /// Expected initial margin per date.
    fn expected_im(&self, netting_set: &str) -> Vec<f64>;
}

/// Precomputed margin matrices (date × sample) keyed by netting set.
///
/// Netting sets without a matrix carry no margin.
///
/// # Examples
///
/// ```
/// use xva_aggregation::margin::{DynamicInitialMargin, StaticInitialMargin};
///
/// let im = StaticInitialMargin::new().with_margin("NS1", vec![vec![2.0, 4.0]]);
/// assert_eq!(im.dynamic_im("NS1", 0, 1).unwrap(), 4.0);
/// assert_eq!(im.expected_im("NS1"), vec![3.0]);
/// assert_eq!(im.dynamic_im("NS2", 0, 0).unwrap(), 0.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticInitialMargin {
    margins: HashMap<String, Vec<Vec<f64>>>,
}

impl StaticInitialMargin {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the margin matrix of a netting set.
    pub fn with_margin(mut self, netting_set: impl Into<String>, margin: Vec<Vec<f64>>) -> Self {
        self.margins.insert(netting_set.into(), margin);
        self
    }
}

impl DynamicInitialMargin for StaticInitialMargin {
    fn dynamic_im(&self, netting_set: &str, date: usize, sample: usize) -> Result<f64, AggregationError> {
        let Some(margin) = self.margins.get(netting_set) else {
            return Ok(0.0);
        };
        margin
            .get(date)
            .and_then(|row| row.get(sample))
            .copied()
            .ok_or_else(|| {
                AggregationError::invalid_parameter(format!(
                    "initial margin of {} has no value at date {}, sample {}",
                    netting_set, date, sample
                ))
            })
    }

    fn expected_im(&self, netting_set: &str) -> Vec<f64> {
        self.margins
            .get(netting_set)
            .map(|margin| {
                margin
                    .iter()
                    .map(|row| {
                        if row.is_empty() {
                            0.0
                        } else {
                            row.iter().sum::<f64>() / row.len() as f64
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
