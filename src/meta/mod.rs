//! Cross-dataset analysis.
//!
//! - cohort aggregation of per-dataset fits (`cohort`)
//! - weighted meta-regression of β on domain covariates (`regression`)
//! - random-forest covariate diagnostics (`forest`)
//! - field-type ANOVA (`anova`)

pub mod anova;
pub mod cohort;
pub mod forest;
pub mod regression;

pub use anova::*;
pub use cohort::*;
pub use forest::*;
pub use regression::*;
