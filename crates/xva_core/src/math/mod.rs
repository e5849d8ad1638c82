//! Numerical helpers.

pub mod distributions;

pub use distributions::{norm_cdf, norm_inv_cdf, norm_pdf};
