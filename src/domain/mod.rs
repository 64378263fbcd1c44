//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - fit configuration enums (`FitMethod`, `AsymptoteMode`, `NullKind`)
//! - validated observation sets (`Observations`)
//! - fit outputs (`LogisticFit`, `NullFit`, `ComparisonResult`, `CohortRecord`)
//! - one explicit schema per output file (`files`)

pub mod files;
pub mod types;

pub use files::*;
pub use types::*;
