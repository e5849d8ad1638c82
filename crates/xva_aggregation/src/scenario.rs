//! Scenario data recorded alongside the valuation cube.
//!
//! Collateral calculations need the simulated FX spot of the CSA currency
//! and the fixing of the CSA compounding index per (date, sample).

use std::collections::HashMap;
use std::fmt;

use crate::error::AggregationError;

/// Kind of scenario series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioDataKind {
    /// FX spot, named by currency pair (e.g. `USDEUR`).
    FxSpot,
    /// Overnight index fixing, named by index.
    IndexFixing,
}

impl fmt::Display for ScenarioDataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioDataKind::FxSpot => write!(f, "FXSpot"),
            ScenarioDataKind::IndexFixing => write!(f, "IndexFixing"),
        }
    }
}

/// Read access to simulated market series.
pub trait ScenarioData: Send + Sync {
    /// True when the series is available.
    fn has(&self, kind: ScenarioDataKind, name: &str) -> bool;

    /// Value of a series at (date index, sample index).
    fn get(&self, date: usize, sample: usize, kind: ScenarioDataKind, name: &str) -> Option<f64>;
}

/// Dense in-memory scenario store, one date × sample matrix per series.
///
/// # Examples
///
/// ```
/// use xva_aggregation::scenario::{InMemoryScenarioData, ScenarioData, ScenarioDataKind};
///
/// let mut data = InMemoryScenarioData::new(2, 3);
/// data.insert(ScenarioDataKind::IndexFixing, "EUR-EONIA", vec![vec![0.01; 3], vec![0.02; 3]])
///     .unwrap();
///
/// assert!(data.has(ScenarioDataKind::IndexFixing, "EUR-EONIA"));
/// assert_eq!(data.get(1, 2, ScenarioDataKind::IndexFixing, "EUR-EONIA"), Some(0.02));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryScenarioData {
    dates: usize,
    samples: usize,
    series: HashMap<(ScenarioDataKind, String), Vec<Vec<f64>>>,
}

impl InMemoryScenarioData {
    /// Creates an empty store for the given grid.
    pub fn new(dates: usize, samples: usize) -> Self {
        Self {
            dates,
            samples,
            series: HashMap::new(),
        }
    }

    /// Adds a date × sample series.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError::DimensionMismatch` if the matrix does not
    /// match the grid.
    pub fn insert(
        &mut self,
        kind: ScenarioDataKind,
        name: impl Into<String>,
        values: Vec<Vec<f64>>,
    ) -> Result<(), AggregationError> {
        let name = name.into();
        if values.len() != self.dates {
            return Err(AggregationError::DimensionMismatch {
                what: format!("{} {} dates", kind, name),
                expected: self.dates,
                actual: values.len(),
            });
        }
        if let Some(row) = values.iter().find(|row| row.len() != self.samples) {
            return Err(AggregationError::DimensionMismatch {
                what: format!("{} {} samples", kind, name),
                expected: self.samples,
                actual: row.len(),
            });
        }
        self.series.insert((kind, name), values);
        Ok(())
    }
}

impl ScenarioData for InMemoryScenarioData {
    fn has(&self, kind: ScenarioDataKind, name: &str) -> bool {
        self.series.contains_key(&(kind, name.to_string()))
    }

    fn get(&self, date: usize, sample: usize, kind: ScenarioDataKind, name: &str) -> Option<f64> {
        self.series
            .get(&(kind, name.to_string()))
            .and_then(|m| m.get(date))
            .and_then(|row| row.get(sample))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_series() {
        let data = InMemoryScenarioData::new(1, 1);
        assert!(!data.has(ScenarioDataKind::FxSpot, "USDEUR"));
        assert_eq!(data.get(0, 0, ScenarioDataKind::FxSpot, "USDEUR"), None);
    }

    #[test]
    fn test_kinds_are_separate() {
        let mut data = InMemoryScenarioData::new(1, 1);
        data.insert(ScenarioDataKind::FxSpot, "X", vec![vec![1.1]]).unwrap();
        assert!(!data.has(ScenarioDataKind::IndexFixing, "X"));
    }

    #[test]
    fn test_dimension_checks() {
        let mut data = InMemoryScenarioData::new(2, 2);
        assert!(data
            .insert(ScenarioDataKind::FxSpot, "USDEUR", vec![vec![1.0, 1.0]])
            .is_err());
        assert!(data
            .insert(ScenarioDataKind::FxSpot, "USDEUR", vec![vec![1.0, 1.0], vec![1.0]])
            .is_err());
    }

    #[test]
    fn test_out_of_grid_lookup_is_none() {
        let mut data = InMemoryScenarioData::new(1, 1);
        data.insert(ScenarioDataKind::FxSpot, "USDEUR", vec![vec![0.9]]).unwrap();
        assert_eq!(data.get(3, 0, ScenarioDataKind::FxSpot, "USDEUR"), None);
    }
}
