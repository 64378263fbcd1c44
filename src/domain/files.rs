//! Output file schemas.
//!
//! Each artifact written by the binary has exactly one struct here, so the
//! JSON layout is explicit and can be read back for aggregation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{
    BootstrapSummary, CiSource, ComparisonResult, FailedDataset, FalsificationGuard, LogisticFit, NullFit,
    NullKind,
};

/// Fitted null models keyed by family; missing entries were skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NullModelSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear: Option<NullFit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<NullFit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exponential: Option<NullFit>,
}

impl NullModelSet {
    pub fn get(&self, kind: NullKind) -> Option<&NullFit> {
        match kind {
            NullKind::Linear => self.linear.as_ref(),
            NullKind::Power => self.power.as_ref(),
            NullKind::Exponential => self.exponential.as_ref(),
        }
    }

    pub fn insert(&mut self, fit: NullFit) {
        match fit.model.kind() {
            NullKind::Linear => self.linear = Some(fit),
            NullKind::Power => self.power = Some(fit),
            NullKind::Exponential => self.exponential = Some(fit),
        }
    }
}

/// A null family that could not be fitted, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedNull {
    pub kind: NullKind,
    pub reason: String,
}

/// Falsification verdict for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FalsificationSummary {
    pub min_delta_aic: f64,
    pub min_r_squared: f64,
    /// True when every fitted null is beaten per the guard.
    pub pass: bool,
    pub strongest_null: Option<NullKind>,
    pub comparisons: Vec<ComparisonResult>,
}

impl FalsificationSummary {
    pub fn from_comparisons(guard: FalsificationGuard, comparisons: Vec<ComparisonResult>) -> Self {
        let strongest_null = comparisons
            .iter()
            .min_by(|a, b| a.delta_aic.total_cmp(&b.delta_aic))
            .map(|c| c.null);
        let pass = !comparisons.is_empty() && comparisons.iter().all(|c| c.falsification_pass);
        Self {
            min_delta_aic: guard.min_delta_aic,
            min_r_squared: guard.min_r_squared,
            pass,
            strongest_null,
            comparisons,
        }
    }
}

/// `tfit fit` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummaryFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub n_points: usize,
    pub rows_skipped: usize,
    pub normalized: bool,
    pub logistic_parameters: LogisticFit,
    pub null_models: NullModelSet,
    #[serde(default)]
    pub skipped_null_models: Vec<SkippedNull>,
    pub beta_ci_95: Option<[f64; 2]>,
    pub theta_ci_95: Option<[f64; 2]>,
    pub ci_source: CiSource,
    pub bootstrap: Option<BootstrapSummary>,
    pub falsification: FalsificationSummary,
}

/// Per-group β statistics in a cohort summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub count: usize,
    pub beta_mean: f64,
    pub beta_std: Option<f64>,
    pub pass_count: usize,
}

/// `tfit cohort` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSummaryFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub manifest: String,
    pub n_datasets: usize,
    pub n_fitted: usize,
    pub canonical_beta: f64,
    pub canonical_band: [f64; 2],
    pub beta_mean: Option<f64>,
    pub beta_median: Option<f64>,
    pub beta_std: Option<f64>,
    /// Fraction of fitted datasets whose β lies inside the canonical band.
    pub fraction_in_band: Option<f64>,
    pub fraction_passing: Option<f64>,
    pub by_domain: BTreeMap<String, GroupStats>,
    pub failed: Vec<FailedDataset>,
    pub records: Vec<super::types::CohortRecord>,
}

/// One hypothesis test after correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedComparison {
    pub dataset: String,
    pub null: NullKind,
    pub delta_aic: f64,
    pub p_value: f64,
    pub bonferroni_p: f64,
    pub holm_p: f64,
    pub bh_q: f64,
    pub uncorrected_significant: bool,
    pub bonferroni_significant: bool,
    pub holm_significant: bool,
    pub bh_significant: bool,
}

/// Rejection counts per correction method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionCounts {
    pub uncorrected: usize,
    pub bonferroni: usize,
    pub holm: usize,
    pub benjamini_hochberg: usize,
}

/// Per-comparison alpha and the ΔAIC a single test would need to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AicThresholds {
    pub uncorrected_alpha: f64,
    pub uncorrected_delta_aic: f64,
    pub bonferroni_alpha: f64,
    pub bonferroni_delta_aic: f64,
}

/// `tfit correct` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionReportFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub alpha: f64,
    pub n_tests: usize,
    pub n_datasets: usize,
    pub counts: CorrectionCounts,
    pub thresholds: AicThresholds,
    pub comparisons: Vec<CorrectedComparison>,
}

/// One row of the meta-regression coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRow {
    pub variable: String,
    pub coefficient: f64,
    pub std_error: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    /// Holm-adjusted across all terms in the model.
    pub p_value_corrected: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub significant: bool,
}

/// Weighted least squares fit statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WlsSummary {
    pub n: usize,
    pub n_parameters: usize,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub aic: f64,
    pub bic: f64,
    pub weighted: bool,
}

/// Bootstrap envelope of the WLS R².
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct R2Envelope {
    pub n_successful: usize,
    pub median: f64,
    pub p05: f64,
    pub p95: f64,
}

/// Random-forest diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestSummary {
    pub n_trees: usize,
    pub oob_r_squared: Option<f64>,
    /// Normalised impurity-decrease importances, sorted descending.
    pub importances: Vec<FeatureImportance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// One-way ANOVA of β across field types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnovaSummary {
    pub n_groups: usize,
    pub f_statistic: f64,
    pub p_value: f64,
    pub eta_squared: f64,
}

/// `tfit meta` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRegressionFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub beta_source: String,
    pub covariate_source: String,
    pub n_domains: usize,
    pub covariates: Vec<String>,
    pub dropped_covariates: Vec<String>,
    pub wls: WlsSummary,
    pub coefficients: Vec<CoefficientRow>,
    pub r_squared_bootstrap: Option<R2Envelope>,
    pub forest: Option<ForestSummary>,
    pub selected_features: Option<Vec<String>>,
    pub anova: Option<AnovaSummary>,
    pub canonical_beta: f64,
    pub fraction_in_band: Option<f64>,
}
