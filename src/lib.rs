//! `threshold-fit` library crate.
//!
//! The binary (`tfit`) is a thin wrapper around this library so that:
//!
//! - fitting, null-model comparison, and corrections are testable without spawning processes
//! - cohort and meta-regression tooling can reuse the single-dataset fitter

pub mod app;
pub mod cli;
pub mod correction;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod meta;
pub mod models;
pub mod report;
