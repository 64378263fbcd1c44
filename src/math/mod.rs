//! Mathematical utilities: least squares, special functions, descriptive stats.

pub mod ols;
pub mod special;
pub mod stats;

pub use ols::*;
pub use special::*;
pub use stats::*;
