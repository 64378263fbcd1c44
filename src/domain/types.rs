//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later for aggregation and multiple-testing correction

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Minimum number of `(R, y)` pairs for any regression.
pub const MIN_POINTS: usize = 3;

/// How the logistic curve is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FitMethod {
    /// Bounded nonlinear least squares on `L / (1 + exp(-β(R-Θ)))`.
    Nonlinear,
    /// OLS of `logit(y)` on `R`; `β = slope`, `Θ = -intercept / slope`.
    LogitLinear,
}

impl FitMethod {
    pub fn display_name(self) -> &'static str {
        match self {
            FitMethod::Nonlinear => "nonlinear least squares",
            FitMethod::LogitLinear => "logit-linear OLS",
        }
    }
}

/// Whether the upper asymptote `L` is estimated or pinned to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AsymptoteMode {
    Free,
    Unit,
}

/// Concrete parameterisation of the logistic curve used in a fit.
///
/// The free parameters are always ordered `[β, Θ, L]`, truncated to the
/// parameters that are actually estimated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogisticForm {
    /// β, Θ and L are estimated.
    FreeAsymptote,
    /// β and Θ are estimated; L is held.
    FixedAsymptote { asymptote: f64 },
    /// Only β is estimated; Θ and L are held.
    FixedThreshold { theta: f64, asymptote: f64 },
}

impl LogisticForm {
    /// Number of estimated parameters (the `k` in AIC/BIC).
    pub fn param_count(self) -> usize {
        match self {
            LogisticForm::FreeAsymptote => 3,
            LogisticForm::FixedAsymptote { .. } => 2,
            LogisticForm::FixedThreshold { .. } => 1,
        }
    }

    /// Expand free parameters into `(β, Θ, L)`.
    pub fn unpack(self, params: &[f64]) -> (f64, f64, f64) {
        match self {
            LogisticForm::FreeAsymptote => (params[0], params[1], params[2]),
            LogisticForm::FixedAsymptote { asymptote } => (params[0], params[1], asymptote),
            LogisticForm::FixedThreshold { theta, asymptote } => (params[0], theta, asymptote),
        }
    }
}

/// Smooth null-model families used as falsification baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NullKind {
    Linear,
    Power,
    Exponential,
}

impl NullKind {
    pub const ALL: [NullKind; 3] = [NullKind::Linear, NullKind::Power, NullKind::Exponential];

    pub fn display_name(self) -> &'static str {
        match self {
            NullKind::Linear => "linear",
            NullKind::Power => "power-law",
            NullKind::Exponential => "exponential",
        }
    }

    /// Column/field suffix used in exports (`delta_aic_<key>`).
    pub fn key(self) -> &'static str {
        match self {
            NullKind::Linear => "linear",
            NullKind::Power => "power",
            NullKind::Exponential => "exponential",
        }
    }
}

/// Fitted null-model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NullModel {
    /// `y = slope * R + intercept`
    Linear { slope: f64, intercept: f64 },
    /// `y = amplitude * R^exponent`
    Power { amplitude: f64, exponent: f64 },
    /// `y = amplitude * exp(rate * R)`
    Exponential { amplitude: f64, rate: f64 },
}

impl NullModel {
    pub fn kind(&self) -> NullKind {
        match self {
            NullModel::Linear { .. } => NullKind::Linear,
            NullModel::Power { .. } => NullKind::Power,
            NullModel::Exponential { .. } => NullKind::Exponential,
        }
    }
}

/// Fit quality diagnostics, in the units of the observed response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub n: usize,
    /// Estimated parameter count used for AIC/BIC.
    pub k: usize,
    pub sse: f64,
    pub rmse: f64,
    pub r_squared: f64,
    pub aic: f64,
    pub bic: f64,
}

/// A fitted logistic threshold model. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticFit {
    pub method: FitMethod,
    pub form: LogisticForm,
    pub beta: f64,
    pub theta: f64,
    /// Upper asymptote `L` (estimated or held).
    pub asymptote: f64,
    pub beta_se: Option<f64>,
    pub theta_se: Option<f64>,
    /// Analytic 95% interval `estimate ± 1.96·se`.
    pub beta_ci_95: Option<[f64; 2]>,
    pub theta_ci_95: Option<[f64; 2]>,
    /// Covariance of the estimated parameters, ordered `[β, Θ, L]` (truncated to `k`).
    pub covariance: Option<Vec<Vec<f64>>>,
    pub quality: FitQuality,
    /// Solver iterations (0 for closed-form fits).
    pub iterations: usize,
}

/// A fitted null model with its quality on the same observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullFit {
    pub model: NullModel,
    pub quality: FitQuality,
}

/// Logistic vs. one null model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub null: NullKind,
    /// `AIC_null - AIC_logistic` (positive favours the threshold model).
    pub delta_aic: f64,
    /// `BIC_null - BIC_logistic`.
    pub delta_bic: f64,
    /// `R²_logistic - R²_null`.
    pub delta_r_squared: f64,
    pub falsification_pass: bool,
}

/// Acceptance rule for the threshold hypothesis against a null.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FalsificationGuard {
    /// ΔAIC must exceed this value.
    pub min_delta_aic: f64,
    /// The logistic R² must reach this floor.
    pub min_r_squared: f64,
}

impl Default for FalsificationGuard {
    fn default() -> Self {
        Self {
            min_delta_aic: 10.0,
            min_r_squared: 0.90,
        }
    }
}

/// Where the reported 95% intervals came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiSource {
    Analytic,
    Bootstrap,
}

/// Percentile-bootstrap summary for β and Θ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub n_requested: usize,
    pub n_successful: usize,
    pub convergence_rate: f64,
    pub beta_mean: f64,
    /// Standard deviation of the bootstrap β distribution (bootstrap SE).
    pub beta_std: f64,
    pub beta_ci_95: [f64; 2],
    pub theta_ci_95: [f64; 2],
    pub beta_ci_width: f64,
    pub beta_ci_width_relative: Option<f64>,
    pub coefficient_of_variation: Option<f64>,
}

/// Ordered `(R, y)` pairs. Invariant: equal lengths, all finite, `len >= MIN_POINTS`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    r: Vec<f64>,
    y: Vec<f64>,
}

impl Observations {
    /// Build an observation set, dropping non-finite pairs.
    pub fn new(r: Vec<f64>, y: Vec<f64>) -> Result<Self, FitError> {
        if r.len() != y.len() {
            return Err(FitError::InvalidInput(format!(
                "R and y must have equal length (got {} and {})",
                r.len(),
                y.len()
            )));
        }
        let (r, y): (Vec<f64>, Vec<f64>) = r
            .into_iter()
            .zip(y)
            .filter(|(a, b)| a.is_finite() && b.is_finite())
            .unzip();
        if r.len() < MIN_POINTS {
            return Err(FitError::InsufficientData {
                needed: MIN_POINTS,
                got: r.len(),
            });
        }
        Ok(Self { r, y })
    }

    /// Pick rows by index (with repetition). Used for bootstrap resamples.
    pub fn resample(&self, indices: &[usize]) -> Self {
        Self {
            r: indices.iter().map(|&i| self.r[i]).collect(),
            y: indices.iter().map(|&i| self.y[i]).collect(),
        }
    }

    pub fn r(&self) -> &[f64] {
        &self.r
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.r.len()
    }

    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    pub fn r_range(&self) -> (f64, f64) {
        min_max(&self.r)
    }

    pub fn y_range(&self) -> (f64, f64) {
        min_max(&self.y)
    }

    /// All responses lie in `[0, 1]`.
    pub fn is_probability_like(&self) -> bool {
        self.y.iter().all(|v| (0.0..=1.0).contains(v))
    }

    /// Min-max rescale the response into `[0, 1]`.
    pub fn normalized(&self) -> Result<Self, FitError> {
        let (lo, hi) = self.y_range();
        let span = hi - lo;
        if span < 1e-10 {
            return Err(FitError::Degenerate(
                "response has no variation; cannot normalise".to_string(),
            ));
        }
        Ok(Self {
            r: self.r.clone(),
            y: self.y.iter().map(|v| (v - lo) / span).collect(),
        })
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// One dataset's row in a cross-domain cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortRecord {
    pub dataset: String,
    pub domain: String,
    pub source: String,
    pub beta: f64,
    pub theta: f64,
    pub beta_ci_lower: Option<f64>,
    pub beta_ci_upper: Option<f64>,
    pub beta_ci_width: Option<f64>,
    pub r_squared: f64,
    pub aic: f64,
    pub delta_aic_linear: Option<f64>,
    pub delta_aic_power: Option<f64>,
    pub delta_aic_exponential: Option<f64>,
    /// ΔAIC against the strongest (lowest-ΔAIC) null.
    pub delta_aic: Option<f64>,
    pub best_null: Option<NullKind>,
    pub falsification_pass: bool,
}

impl CohortRecord {
    pub fn delta_aic_for(&self, kind: NullKind) -> Option<f64> {
        match kind {
            NullKind::Linear => self.delta_aic_linear,
            NullKind::Power => self.delta_aic_power,
            NullKind::Exponential => self.delta_aic_exponential,
        }
    }
}

/// A dataset that could not be fitted during a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedDataset {
    pub dataset: String,
    pub source: String,
    pub error: String,
}

/// Column names that carry `R` and the response in an input CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub r: String,
    pub response: String,
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self {
            r: "R".to_string(),
            response: "response".to_string(),
        }
    }
}

/// Single-dataset run configuration, derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub columns: ColumnSpec,
    pub method: FitMethod,
    pub asymptote: AsymptoteMode,
    pub fixed_theta: Option<f64>,
    pub normalize: bool,
    pub n_bootstrap: usize,
    pub seed: u64,
    pub null_models: Vec<NullKind>,
    pub guard: FalsificationGuard,
    pub max_iterations: usize,
}

/// Cohort (many datasets) run configuration.
#[derive(Debug, Clone)]
pub struct CohortConfig {
    pub manifest: PathBuf,
    pub output: PathBuf,
    pub records_csv: Option<PathBuf>,
    /// Per-dataset settings; `input`/`output` are replaced per manifest row.
    pub fit: FitConfig,
    pub canonical_beta: f64,
    pub canonical_band: (f64, f64),
}

/// Multiple-testing correction run configuration.
#[derive(Debug, Clone)]
pub struct CorrectionConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub alpha: f64,
}

/// Meta-regression run configuration.
#[derive(Debug, Clone)]
pub struct MetaConfig {
    pub beta_csv: PathBuf,
    pub covariates_csv: PathBuf,
    pub output_dir: PathBuf,
    pub covariates: Vec<String>,
    pub use_field_types: bool,
    pub n_bootstrap: usize,
    pub rf_trees: usize,
    pub top_features: Option<usize>,
    pub seed: u64,
    pub alpha: f64,
    pub canonical_beta: f64,
    pub canonical_band: (f64, f64),
}

/// Synthetic dataset generation settings.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub output: PathBuf,
    pub n: usize,
    pub beta: f64,
    pub theta: f64,
    pub asymptote: f64,
    pub r_min: f64,
    pub r_max: f64,
    pub noise: f64,
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observations_drop_non_finite_pairs() {
        let obs = Observations::new(
            vec![0.0, 1.0, f64::NAN, 3.0, 4.0],
            vec![0.1, 0.2, 0.3, f64::INFINITY, 0.5],
        )
        .unwrap();
        assert_eq!(obs.r(), &[0.0, 1.0, 4.0]);
        assert_eq!(obs.y(), &[0.1, 0.2, 0.5]);
    }

    #[test]
    fn observations_require_min_points_after_filtering() {
        let err = Observations::new(vec![0.0, 1.0, f64::NAN], vec![0.1, 0.2, 0.3]).unwrap_err();
        assert_eq!(err, FitError::InsufficientData { needed: 3, got: 2 });
    }

    #[test]
    fn observations_reject_length_mismatch() {
        let err = Observations::new(vec![0.0, 1.0, 2.0], vec![0.1, 0.2]).unwrap_err();
        assert!(matches!(err, FitError::InvalidInput(_)));
    }

    #[test]
    fn normalized_maps_to_unit_interval() {
        let obs = Observations::new(vec![0.0, 1.0, 2.0], vec![10.0, 15.0, 20.0]).unwrap();
        let norm = obs.normalized().unwrap();
        assert_eq!(norm.y(), &[0.0, 0.5, 1.0]);
        assert!(norm.is_probability_like());

        let flat = Observations::new(vec![0.0, 1.0, 2.0], vec![3.0, 3.0, 3.0]).unwrap();
        assert!(matches!(flat.normalized(), Err(FitError::Degenerate(_))));
    }

    #[test]
    fn logistic_form_unpacks_in_beta_theta_l_order() {
        let form = LogisticForm::FixedThreshold {
            theta: 0.4,
            asymptote: 1.0,
        };
        assert_eq!(form.param_count(), 1);
        assert_eq!(form.unpack(&[5.0]), (5.0, 0.4, 1.0));
        assert_eq!(LogisticForm::FreeAsymptote.unpack(&[1.0, 2.0, 3.0]), (1.0, 2.0, 3.0));
    }
}
