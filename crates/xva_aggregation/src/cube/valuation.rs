//! Valuation cube of simulated trade NPVs.

use super::ExposureCube;
use crate::error::AggregationError;

/// How the depths of a valuation cube are laid out.
///
/// Decided once when the cube is wrapped, so consumers never inspect the
/// cube to guess its layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeInterpretation {
    /// Depth 0 holds the value used both on default and on close-out.
    Regular,
    /// Depth 0 holds default values and depth 1 close-out values
    /// simulated one margin period of risk later.
    CloseOutGrid,
}

/// Trade NPV cube together with its interpretation.
#[derive(Debug, Clone)]
pub struct ValuationCube {
    cube: ExposureCube,
    interpretation: CubeInterpretation,
}

impl ValuationCube {
    /// Wraps a cube whose depth 0 carries every value.
    pub fn regular(cube: ExposureCube) -> Self {
        Self {
            cube,
            interpretation: CubeInterpretation::Regular,
        }
    }

    /// Wraps a cube with separate default (depth 0) and close-out (depth 1) values.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError::DimensionMismatch` if the cube depth is below 2.
    pub fn close_out_grid(cube: ExposureCube) -> Result<Self, AggregationError> {
        if cube.depth() < 2 {
            return Err(AggregationError::DimensionMismatch {
                what: "close-out grid cube depth".to_string(),
                expected: 2,
                actual: cube.depth(),
            });
        }
        Ok(Self {
            cube,
            interpretation: CubeInterpretation::CloseOutGrid,
        })
    }

    /// Layout tag.
    #[inline]
    pub fn interpretation(&self) -> CubeInterpretation {
        self.interpretation
    }

    /// Underlying cube.
    #[inline]
    pub fn cube(&self) -> &ExposureCube {
        &self.cube
    }

    /// Today's value of a trade.
    #[inline]
    pub fn t0_value(&self, trade: usize) -> f64 {
        self.cube.get_t0(trade, 0)
    }

    /// Value of a trade on default at (date, sample).
    #[inline]
    pub fn default_value(&self, trade: usize, date: usize, sample: usize) -> f64 {
        self.cube.get(trade, date, sample, 0)
    }

    /// Value of a trade on close-out at (date, sample).
    #[inline]
    pub fn close_out_value(&self, trade: usize, date: usize, sample: usize) -> f64 {
        match self.interpretation {
            CubeInterpretation::Regular => self.cube.get(trade, date, sample, 0),
            CubeInterpretation::CloseOutGrid => self.cube.get(trade, date, sample, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xva_core::types::Date;

    fn npv_cube(depth: usize) -> ExposureCube {
        let today = Date::from_ymd(2024, 1, 2).unwrap();
        let dates = vec![Date::from_ymd(2024, 7, 2).unwrap()];
        let mut cube = ExposureCube::new(vec!["T1".into()], today, dates, 1, depth).unwrap();
        cube.set(0, 0, 0, 0, 10.0);
        if depth > 1 {
            cube.set(0, 0, 0, 1, 12.0);
        }
        cube.set_t0(0, 0, 7.0);
        cube
    }

    #[test]
    fn test_regular_close_out_equals_default() {
        let cube = ValuationCube::regular(npv_cube(1));
        assert_eq!(cube.interpretation(), CubeInterpretation::Regular);
        assert_eq!(cube.default_value(0, 0, 0), 10.0);
        assert_eq!(cube.close_out_value(0, 0, 0), 10.0);
        assert_eq!(cube.t0_value(0), 7.0);
    }

    #[test]
    fn test_close_out_grid_reads_second_depth() {
        let cube = ValuationCube::close_out_grid(npv_cube(2)).unwrap();
        assert_eq!(cube.default_value(0, 0, 0), 10.0);
        assert_eq!(cube.close_out_value(0, 0, 0), 12.0);
    }

    #[test]
    fn test_close_out_grid_requires_depth_two() {
        assert!(ValuationCube::close_out_grid(npv_cube(1)).is_err());
    }
}
