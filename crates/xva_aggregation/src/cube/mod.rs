//! Dense exposure storage.
//!
//! Provides the [`ExposureCube`], a contiguous 4-D store indexed by
//! (entity, date, sample, depth) plus a time-0 slice, and the
//! [`ValuationCube`] wrapper that tags how NPV depths are interpreted.

mod valuation;

pub use valuation::{CubeInterpretation, ValuationCube};

use std::collections::HashMap;

use xva_core::types::Date;

use crate::error::AggregationError;

/// Depth of a trade exposure cube (EPE, ENE, allocated EPE, allocated ENE).
pub const TRADE_CUBE_DEPTH: usize = 4;

/// Depth of a netting-set exposure cube (EPE, ENE).
pub const NETTING_CUBE_DEPTH: usize = 2;

/// Measure stored at a cube depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasureSlot {
    /// Positive part of exposure.
    Epe,
    /// Negative part of exposure, stored as a positive number.
    Ene,
    /// EPE allocated from the netting set.
    AllocatedEpe,
    /// ENE allocated from the netting set.
    AllocatedEne,
}

impl MeasureSlot {
    /// Cube depth holding this measure.
    #[inline]
    pub fn depth(self) -> usize {
        match self {
            MeasureSlot::Epe => 0,
            MeasureSlot::Ene => 1,
            MeasureSlot::AllocatedEpe => 2,
            MeasureSlot::AllocatedEne => 3,
        }
    }
}

/// Pair of slots an XVA calculation reads its positive and negative
/// exposure from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExposureSlots {
    /// Slot read as positive exposure.
    pub epe: MeasureSlot,
    /// Slot read as negative exposure.
    pub ene: MeasureSlot,
}

impl ExposureSlots {
    /// Standalone trade exposure.
    pub const STANDALONE: ExposureSlots = ExposureSlots {
        epe: MeasureSlot::Epe,
        ene: MeasureSlot::Ene,
    };

    /// Exposure allocated from the netting set.
    pub const ALLOCATED: ExposureSlots = ExposureSlots {
        epe: MeasureSlot::AllocatedEpe,
        ene: MeasureSlot::AllocatedEne,
    };
}

/// Dense cube of values per (entity, date, sample, depth).
///
/// Entities are either trades or netting sets; they are held in an arena
/// with a name→index lookup built once at construction. Hot loops work on
/// integer indices.
///
/// # Examples
///
/// ```
/// use xva_aggregation::cube::{ExposureCube, MeasureSlot};
/// use xva_core::types::Date;
///
/// let today = Date::from_ymd(2024, 1, 2).unwrap();
/// let dates = vec![Date::from_ymd(2025, 1, 2).unwrap()];
/// let mut cube = ExposureCube::new(vec!["NS1".to_string()], today, dates, 2, 2).unwrap();
///
/// cube.set(0, 0, 1, MeasureSlot::Ene.depth(), 3.0);
/// assert_eq!(cube.get(0, 0, 1, 1), 3.0);
/// assert_eq!(cube.mean_over_samples(0, 1), vec![1.5]);
/// ```
#[derive(Debug, Clone)]
pub struct ExposureCube {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    asof: Date,
    dates: Vec<Date>,
    samples: usize,
    depth: usize,
    t0: Vec<f64>,
    data: Vec<f64>,
}

impl ExposureCube {
    /// Creates a zero-filled cube.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError::InvalidParameter` when
    /// - `samples` or `depth` is zero
    /// - an id repeats
    /// - dates are not strictly increasing or not after `asof`
    pub fn new(
        ids: Vec<String>,
        asof: Date,
        dates: Vec<Date>,
        samples: usize,
        depth: usize,
    ) -> Result<Self, AggregationError> {
        if samples == 0 || depth == 0 {
            return Err(AggregationError::invalid_parameter(format!(
                "cube needs at least one sample and one depth (samples = {}, depth = {})",
                samples, depth
            )));
        }
        let mut previous = asof;
        for date in &dates {
            if *date <= previous {
                return Err(AggregationError::invalid_parameter(format!(
                    "cube date {} must be after {}",
                    date, previous
                )));
            }
            previous = *date;
        }
        let mut index = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                return Err(AggregationError::invalid_parameter(format!(
                    "duplicate cube id {}",
                    id
                )));
            }
        }
        let n = ids.len();
        Ok(Self {
            t0: vec![0.0; n * depth],
            data: vec![0.0; n * dates.len() * samples * depth],
            ids,
            index,
            asof,
            dates,
            samples,
            depth,
        })
    }

    #[inline]
    fn offset(&self, id: usize, date: usize, sample: usize, depth: usize) -> usize {
        debug_assert!(date < self.dates.len() && sample < self.samples && depth < self.depth);
        ((id * self.dates.len() + date) * self.samples + sample) * self.depth + depth
    }

    /// Value at (entity, date, sample, depth).
    #[inline]
    pub fn get(&self, id: usize, date: usize, sample: usize, depth: usize) -> f64 {
        self.data[self.offset(id, date, sample, depth)]
    }

    /// Stores a value at (entity, date, sample, depth).
    #[inline]
    pub fn set(&mut self, id: usize, date: usize, sample: usize, depth: usize, value: f64) {
        let i = self.offset(id, date, sample, depth);
        self.data[i] = value;
    }

    /// Time-0 value of an entity.
    #[inline]
    pub fn get_t0(&self, id: usize, depth: usize) -> f64 {
        self.t0[id * self.depth + depth]
    }

    /// Stores a time-0 value.
    #[inline]
    pub fn set_t0(&mut self, id: usize, depth: usize, value: f64) {
        self.t0[id * self.depth + depth] = value;
    }

    /// Sample mean per date for one entity and depth.
    pub fn mean_over_samples(&self, id: usize, depth: usize) -> Vec<f64> {
        let n = self.samples as f64;
        (0..self.dates.len())
            .map(|j| {
                (0..self.samples)
                    .map(|k| self.get(id, j, k, depth))
                    .sum::<f64>()
                    / n
            })
            .collect()
    }

    /// Arena index of an id.
    #[inline]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Ids in arena order.
    #[inline]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Number of entities.
    #[inline]
    pub fn num_ids(&self) -> usize {
        self.ids.len()
    }

    /// Valuation date.
    #[inline]
    pub fn asof(&self) -> Date {
        self.asof
    }

    /// Future simulation dates.
    #[inline]
    pub fn dates(&self) -> &[Date] {
        &self.dates
    }

    /// Number of future dates.
    #[inline]
    pub fn num_dates(&self) -> usize {
        self.dates.len()
    }

    /// Number of samples per date.
    #[inline]
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Number of values per (entity, date, sample).
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Write access restricted to the allocated measure slots.
    ///
    /// Returns `None` if the cube is not deep enough to hold them.
    pub fn allocated_slots_mut(&mut self) -> Option<AllocatedSlots<'_>> {
        (self.depth >= TRADE_CUBE_DEPTH).then_some(AllocatedSlots { cube: self })
    }
}

/// Mutable view over the allocated EPE/ENE slots of a trade cube.
///
/// Standalone slots stay read-only through this view.
#[derive(Debug)]
pub struct AllocatedSlots<'a> {
    cube: &'a mut ExposureCube,
}

impl AllocatedSlots<'_> {
    /// Stores allocated EPE and ENE for (trade, date, sample).
    #[inline]
    pub fn set(&mut self, trade: usize, date: usize, sample: usize, epe: f64, ene: f64) {
        self.cube
            .set(trade, date, sample, MeasureSlot::AllocatedEpe.depth(), epe);
        self.cube
            .set(trade, date, sample, MeasureSlot::AllocatedEne.depth(), ene);
    }

    /// Stores allocated time-0 EPE and ENE.
    #[inline]
    pub fn set_t0(&mut self, trade: usize, epe: f64, ene: f64) {
        self.cube.set_t0(trade, MeasureSlot::AllocatedEpe.depth(), epe);
        self.cube.set_t0(trade, MeasureSlot::AllocatedEne.depth(), ene);
    }

    /// Read access to the underlying cube.
    #[inline]
    pub fn cube(&self) -> &ExposureCube {
        &*self.cube
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates() -> (Date, Vec<Date>) {
        let today = Date::from_ymd(2024, 1, 2).unwrap();
        let dates = vec![
            Date::from_ymd(2024, 4, 2).unwrap(),
            Date::from_ymd(2024, 7, 2).unwrap(),
            Date::from_ymd(2024, 10, 2).unwrap(),
        ];
        (today, dates)
    }

    fn cube(depth: usize) -> ExposureCube {
        let (today, dates) = dates();
        ExposureCube::new(vec!["A".into(), "B".into()], today, dates, 4, depth).unwrap()
    }

    #[test]
    fn test_dimensions() {
        let c = cube(2);
        assert_eq!(c.num_ids(), 2);
        assert_eq!(c.num_dates(), 3);
        assert_eq!(c.samples(), 4);
        assert_eq!(c.depth(), 2);
        assert_eq!(c.index_of("B"), Some(1));
        assert_eq!(c.index_of("C"), None);
    }

    #[test]
    fn test_values_do_not_alias() {
        let mut c = cube(2);
        let mut v = 0.0;
        for id in 0..2 {
            for j in 0..3 {
                for k in 0..4 {
                    for d in 0..2 {
                        c.set(id, j, k, d, v);
                        v += 1.0;
                    }
                }
            }
        }
        let mut expected = 0.0;
        for id in 0..2 {
            for j in 0..3 {
                for k in 0..4 {
                    for d in 0..2 {
                        assert_eq!(c.get(id, j, k, d), expected);
                        expected += 1.0;
                    }
                }
            }
        }
    }

    #[test]
    fn test_t0_slice() {
        let mut c = cube(2);
        c.set_t0(1, 1, 42.0);
        assert_eq!(c.get_t0(1, 1), 42.0);
        assert_eq!(c.get_t0(1, 0), 0.0);
        assert_eq!(c.get_t0(0, 1), 0.0);
    }

    #[test]
    fn test_mean_over_samples() {
        let mut c = cube(2);
        for k in 0..4 {
            c.set(0, 2, k, 0, k as f64);
        }
        assert_eq!(c.mean_over_samples(0, 0), vec![0.0, 0.0, 1.5]);
    }

    #[test]
    fn test_rejects_bad_grids() {
        let (today, dates) = dates();
        assert!(ExposureCube::new(vec!["A".into()], today, dates.clone(), 0, 1).is_err());
        assert!(ExposureCube::new(vec!["A".into(), "A".into()], today, dates.clone(), 1, 1).is_err());
        let mut unsorted = dates;
        unsorted.swap(0, 1);
        assert!(ExposureCube::new(vec!["A".into()], today, unsorted, 1, 1).is_err());
        assert!(ExposureCube::new(vec!["A".into()], today, vec![today], 1, 1).is_err());
    }

    #[test]
    fn test_allocated_slots_only_on_trade_cubes() {
        let mut netting = cube(NETTING_CUBE_DEPTH);
        assert!(netting.allocated_slots_mut().is_none());

        let mut trades = cube(TRADE_CUBE_DEPTH);
        trades.set(0, 0, 0, MeasureSlot::Epe.depth(), 9.0);
        {
            let mut slots = trades.allocated_slots_mut().unwrap();
            slots.set(0, 0, 0, 1.0, 2.0);
            slots.set_t0(0, 3.0, 4.0);
        }
        assert_eq!(trades.get(0, 0, 0, MeasureSlot::Epe.depth()), 9.0);
        assert_eq!(trades.get(0, 0, 0, MeasureSlot::AllocatedEpe.depth()), 1.0);
        assert_eq!(trades.get(0, 0, 0, MeasureSlot::AllocatedEne.depth()), 2.0);
        assert_eq!(trades.get_t0(0, MeasureSlot::AllocatedEne.depth()), 4.0);
    }

    #[test]
    fn test_slot_pairs_are_distinct() {
        assert_ne!(ExposureSlots::STANDALONE, ExposureSlots::ALLOCATED);
        assert_eq!(ExposureSlots::ALLOCATED.epe.depth(), 2);
    }
}
