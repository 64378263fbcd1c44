//! Logistic threshold fitting.
//!
//! Responsibilities:
//!
//! - fit `L σ(β(R - Θ))` by bounded nonlinear least squares or logit-linear OLS
//! - start the nonlinear solver from a small grid (parallel)
//! - fit linear / power-law / exponential nulls and compare by AIC
//! - bootstrap percentile intervals for β and Θ (parallel, seeded)

pub mod bootstrap;
pub mod fitter;
pub mod lm;
pub mod nulls;
pub mod selection;
pub mod starts;

pub use bootstrap::*;
pub use fitter::*;
pub use nulls::*;
pub use selection::*;
