//! Error types.
//!
//! - `FitError`: numerical/data failures raised by the fitting library. Callers
//!   processing many datasets match on it and keep going.
//! - `AppError`: what the binary reports (message + process exit code).
//!
//! Exit codes:
//! - `2`: input, schema, or I/O problems
//! - `3`: too little (or degenerate) data to fit
//! - `4`: numerical failure (solver did not converge, singular system)

use thiserror::Error;

/// Failure modes of the fitting routines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient data: need at least {needed} points, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("degenerate data: {0}")]
    Degenerate(String),

    #[error("fit did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("numerical failure: {0}")]
    Numerical(String),
}

impl FitError {
    /// Exit code used when this error terminates the process.
    pub fn exit_code(&self) -> u8 {
        match self {
            FitError::InvalidInput(_) => 2,
            FitError::InsufficientData { .. } | FitError::Degenerate(_) => 3,
            FitError::NotConverged { .. } | FitError::Numerical(_) => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefix the message with context (e.g. the dataset being processed).
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        Self {
            exit_code: self.exit_code,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
