//! Human-readable run summaries.

pub mod format;

pub use format::*;
