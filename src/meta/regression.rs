//! Weighted meta-regression of β on domain covariates.
//!
//! Workflow:
//! 1. inner-join the β table and the covariate table on `domain` (one-to-one)
//! 2. optional field-type one-hot dummies (`FT_<type>`, first sorted type dropped)
//! 3. optional random-forest pre-selection of the top-k continuous covariates
//! 4. WLS with inverse-variance weights `1 / beta_ci_width²`
//! 5. coefficient table (t statistics, two-sided p, Holm-adjusted p, t-based CI)
//! 6. bootstrap envelope of R², forest diagnostics, field-type ANOVA
//!
//! Missing covariate cells become `0.0`; requested covariates that are absent
//! from the table are dropped. Both are logged.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::correction::holm;
use crate::domain::{
    AnovaSummary, CoefficientRow, FeatureImportance, ForestSummary, R2Envelope, WlsSummary,
};
use crate::error::FitError;
use crate::fit::resample_seed;
use crate::math::{median, percentile, student_t_quantile, student_t_two_sided_p, weighted_least_squares};
use crate::meta::anova::one_way_anova;
use crate::meta::forest::{fit_forest, top_features, ForestOptions};

/// Name of the intercept column in coefficient tables.
pub const INTERCEPT: &str = "const";
/// Prefix of field-type dummy columns.
pub const FIELD_TYPE_PREFIX: &str = "FT_";

/// Resamples below which the R² envelope is not reported.
const MIN_R2_RESAMPLES: usize = 10;

/// One row of the β table.
#[derive(Debug, Clone, PartialEq)]
pub struct BetaRow {
    pub domain: String,
    pub beta: f64,
    pub beta_ci_width: Option<f64>,
}

/// One row of the covariate table. Cells that failed to parse are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateRow {
    pub domain: String,
    pub field_type: Option<String>,
    pub values: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CovariateTable {
    /// Numeric covariate columns present in the file.
    pub columns: Vec<String>,
    pub rows: Vec<CovariateRow>,
}

/// Joined, cleaned inputs for the regression.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaDataset {
    pub domains: Vec<String>,
    pub beta: Vec<f64>,
    /// Inverse-variance weights; None means uniform.
    pub weights: Option<Vec<f64>>,
    pub continuous_names: Vec<String>,
    /// Row-major continuous covariates, aligned with `continuous_names`.
    pub continuous: Vec<Vec<f64>>,
    pub field_types: Option<Vec<String>>,
    pub dropped: Vec<String>,
}

/// `1 / width²` for usable widths, missing ones filled with the median weight.
///
/// None when no width is usable.
pub fn inverse_variance_weights(widths: &[Option<f64>]) -> Option<Vec<f64>> {
    let inv: Vec<Option<f64>> = widths
        .iter()
        .map(|w| w.filter(|v| v.is_finite() && *v > 0.0).map(|v| 1.0 / (v * v)))
        .collect();
    let valid: Vec<f64> = inv.iter().flatten().copied().collect();
    let fill = median(&valid)?;
    Some(inv.into_iter().map(|w| w.unwrap_or(fill)).collect())
}

/// Join β and covariates on domain and resolve the requested covariates.
pub fn build_meta_dataset(
    betas: &[BetaRow],
    covariates: &CovariateTable,
    requested: &[String],
    use_field_types: bool,
) -> Result<MetaDataset, FitError> {
    ensure_unique(betas.iter().map(|b| b.domain.as_str()), "beta")?;
    ensure_unique(covariates.rows.iter().map(|c| c.domain.as_str()), "covariate")?;

    let by_domain: BTreeMap<&str, &CovariateRow> =
        covariates.rows.iter().map(|c| (c.domain.as_str(), c)).collect();

    let available: HashSet<&str> = covariates.columns.iter().map(String::as_str).collect();
    let (continuous_names, dropped): (Vec<String>, Vec<String>) =
        requested.iter().cloned().partition(|name| available.contains(name.as_str()));
    for name in &dropped {
        warn!(covariate = %name, "covariate not found in covariate table; dropped");
    }

    let mut domains = Vec::new();
    let mut beta = Vec::new();
    let mut widths = Vec::new();
    let mut continuous = Vec::new();
    let mut field_types = Vec::new();
    let mut filled = 0usize;

    for row in betas {
        let Some(cov) = by_domain.get(row.domain.as_str()) else {
            continue;
        };
        if !row.beta.is_finite() {
            warn!(domain = %row.domain, "non-finite beta; domain skipped");
            continue;
        }
        let values: Vec<f64> = continuous_names
            .iter()
            .map(|name| match cov.values.get(name).copied().flatten() {
                Some(v) if v.is_finite() => v,
                _ => {
                    filled += 1;
                    0.0
                }
            })
            .collect();
        domains.push(row.domain.clone());
        beta.push(row.beta);
        widths.push(row.beta_ci_width);
        continuous.push(values);
        field_types.push(cov.field_type.clone().unwrap_or_else(|| "unknown".to_string()));
    }

    if filled > 0 {
        warn!(cells = filled, "missing covariate values filled with 0");
    }
    let unmatched = betas.len() - domains.len();
    if unmatched > 0 {
        info!(unmatched, "beta rows without matching covariates were dropped");
    }

    let weights = inverse_variance_weights(&widths);
    if weights.is_none() {
        warn!("no usable beta_ci_width values; using uniform weights");
    }

    let has_field_types = covariates.rows.iter().any(|r| r.field_type.is_some());
    let field_types = match (use_field_types, has_field_types) {
        (true, true) => Some(field_types),
        (true, false) => {
            warn!("field_type column missing; continuing without field-type dummies");
            None
        }
        (false, _) => None,
    };

    Ok(MetaDataset {
        domains,
        beta,
        weights,
        continuous_names,
        continuous,
        field_types,
        dropped,
    })
}

fn ensure_unique<'a>(domains: impl Iterator<Item = &'a str>, table: &str) -> Result<(), FitError> {
    let mut seen = HashSet::new();
    for d in domains {
        if !seen.insert(d) {
            return Err(FitError::InvalidInput(format!(
                "domain '{d}' appears more than once in the {table} table"
            )));
        }
    }
    Ok(())
}

/// Column names and row-major values of the design (without intercept).
pub fn design_columns(ds: &MetaDataset, selected: &[String]) -> (Vec<String>, Vec<Vec<f64>>) {
    let mut names = Vec::new();
    let mut rows: Vec<Vec<f64>> = vec![Vec::new(); ds.beta.len()];

    if let Some(types) = &ds.field_types {
        let categories: BTreeSet<&str> = types.iter().map(String::as_str).collect();
        for cat in categories.into_iter().skip(1) {
            names.push(format!("{FIELD_TYPE_PREFIX}{cat}"));
            for (row, t) in rows.iter_mut().zip(types) {
                row.push(if t == cat { 1.0 } else { 0.0 });
            }
        }
    }

    for name in selected {
        if let Some(j) = ds.continuous_names.iter().position(|n| n == name) {
            names.push(name.clone());
            for (row, src) in rows.iter_mut().zip(&ds.continuous) {
                row.push(src[j]);
            }
        }
    }

    (names, rows)
}

/// Fitted WLS model with its coefficient table.
#[derive(Debug, Clone, PartialEq)]
pub struct WlsFit {
    pub summary: WlsSummary,
    pub coefficients: Vec<CoefficientRow>,
}

/// Weighted least squares of `y` on `[1, rows]` with inference at level `alpha`.
pub fn fit_wls(
    y: &[f64],
    names: &[String],
    rows: &[Vec<f64>],
    weights: Option<&[f64]>,
    alpha: f64,
) -> Result<WlsFit, FitError> {
    let n = y.len();
    let p = names.len() + 1;
    if n <= p {
        return Err(FitError::InsufficientData { needed: p + 1, got: n });
    }

    let (design, target) = design_matrix(y, rows, p);
    let fit = weighted_least_squares(&design, &target, weights)
        .ok_or_else(|| FitError::Numerical("weighted least squares failed".to_string()))?;

    let w: Vec<f64> = weights.map(<[f64]>::to_vec).unwrap_or_else(|| vec![1.0; n]);
    let r_squared = weighted_r_squared(y, &w, fit.sse);
    let dof = fit.dof as f64;
    let n_f = n as f64;
    let adj_r_squared = 1.0 - (n_f - 1.0) / dof * (1.0 - r_squared);

    // Gaussian log-likelihood of the weighted model.
    let llf = -n_f / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (fit.sse / n_f).ln() + 1.0)
        + 0.5 * w.iter().map(|v| v.ln()).sum::<f64>();
    let aic = -2.0 * llf + 2.0 * p as f64;
    let bic = -2.0 * llf + p as f64 * n_f.ln();

    let t_crit = student_t_quantile(1.0 - alpha / 2.0, dof);
    let mut variables = Vec::with_capacity(p);
    variables.push(INTERCEPT.to_string());
    variables.extend(names.iter().cloned());

    let mut table: Vec<CoefficientRow> = variables
        .into_iter()
        .enumerate()
        .map(|(j, variable)| {
            let coefficient = fit.coefficients[j];
            let std_error = fit.std_error(j).unwrap_or(f64::NAN);
            let t_statistic = coefficient / std_error;
            let p_value = student_t_two_sided_p(t_statistic, dof);
            CoefficientRow {
                variable,
                coefficient,
                std_error,
                t_statistic,
                p_value,
                p_value_corrected: p_value,
                ci_lower: coefficient - t_crit * std_error,
                ci_upper: coefficient + t_crit * std_error,
                significant: false,
            }
        })
        .collect();
    apply_holm(&mut table, alpha);

    Ok(WlsFit {
        summary: WlsSummary {
            n,
            n_parameters: p,
            r_squared,
            adj_r_squared,
            aic,
            bic,
            weighted: weights.is_some(),
        },
        coefficients: table,
    })
}

/// Fill `p_value_corrected` (Holm across all rows) and flag rows whose
/// corrected p-value is below `alpha`. NaN p-values count as 1.
fn apply_holm(table: &mut [CoefficientRow], alpha: f64) {
    let raw: Vec<f64> = table
        .iter()
        .map(|r| if r.p_value.is_nan() { 1.0 } else { r.p_value })
        .collect();
    let adjusted = holm(&raw, alpha).adjusted;
    for (row, adj) in table.iter_mut().zip(adjusted) {
        row.p_value_corrected = adj;
        row.significant = adj < alpha;
    }
}

fn design_matrix(y: &[f64], rows: &[Vec<f64>], p: usize) -> (DMatrix<f64>, DVector<f64>) {
    let design = DMatrix::from_fn(y.len(), p, |i, j| if j == 0 { 1.0 } else { rows[i][j - 1] });
    (design, DVector::from_column_slice(y))
}

/// `1 - SSE_w / Σ w (y - ȳ_w)²`.
fn weighted_r_squared(y: &[f64], w: &[f64], sse: f64) -> f64 {
    let w_sum: f64 = w.iter().sum();
    let y_bar = y.iter().zip(w).map(|(a, b)| a * b).sum::<f64>() / w_sum;
    let tss: f64 = y.iter().zip(w).map(|(a, b)| b * (a - y_bar) * (a - y_bar)).sum();
    if tss <= 0.0 {
        return 1.0;
    }
    1.0 - sse / tss
}

/// Bootstrap envelope (median, 5th and 95th percentiles) of the WLS R².
pub fn bootstrap_r2(
    y: &[f64],
    rows: &[Vec<f64>],
    weights: Option<&[f64]>,
    n_boot: usize,
    seed: u64,
) -> Option<R2Envelope> {
    let n = y.len();
    let p = rows.first().map_or(0, Vec::len) + 1;
    let values: Vec<f64> = (0..n_boot)
        .into_par_iter()
        .filter_map(|b| {
            let mut rng = StdRng::seed_from_u64(resample_seed(seed, b));
            let idx: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let ys: Vec<f64> = idx.iter().map(|&i| y[i]).collect();
            let xs: Vec<Vec<f64>> = idx.iter().map(|&i| rows[i].clone()).collect();
            let ws: Vec<f64> = idx.iter().map(|&i| weights.map_or(1.0, |w| w[i])).collect();
            let (design, target) = design_matrix(&ys, &xs, p);
            let fit = weighted_least_squares(&design, &target, Some(&ws))?;
            let r2 = weighted_r_squared(&ys, &ws, fit.sse);
            r2.is_finite().then_some(r2)
        })
        .collect();

    if values.len() < MIN_R2_RESAMPLES {
        warn!(successful = values.len(), "too few bootstrap regressions for an R² envelope");
        return None;
    }
    Some(R2Envelope {
        n_successful: values.len(),
        median: median(&values)?,
        p05: percentile(&values, 5.0)?,
        p95: percentile(&values, 95.0)?,
    })
}

/// Settings for a full meta-regression run.
#[derive(Debug, Clone)]
pub struct MetaOptions {
    pub n_bootstrap: usize,
    pub rf_trees: usize,
    pub top_features: Option<usize>,
    pub seed: u64,
    pub alpha: f64,
}

/// Everything a meta-regression run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaOutcome {
    pub design_names: Vec<String>,
    pub wls: WlsFit,
    pub r_squared_bootstrap: Option<R2Envelope>,
    pub forest: Option<ForestSummary>,
    pub selected_features: Option<Vec<String>>,
    pub anova: Option<AnovaSummary>,
}

/// Run the full meta-regression on a joined dataset.
pub fn run_meta_regression(ds: &MetaDataset, opts: &MetaOptions) -> Result<MetaOutcome, FitError> {
    let anova = ds
        .field_types
        .as_ref()
        .and_then(|types| one_way_anova(&ds.beta, types));

    let forest_opts = ForestOptions {
        n_trees: opts.rf_trees,
        seed: opts.seed,
        ..ForestOptions::default()
    };

    let selected_features = match opts.top_features {
        Some(k) if !ds.continuous_names.is_empty() && opts.rf_trees > 0 => {
            let pre = fit_forest(&ds.continuous, &ds.beta, None, &forest_opts)?;
            let chosen = top_features(&ds.continuous_names, &pre.importances, k);
            info!(features = ?chosen, "top covariates selected");
            Some(chosen)
        }
        _ => None,
    };
    let selected = selected_features.clone().unwrap_or_else(|| ds.continuous_names.clone());

    let (names, rows) = design_columns(ds, &selected);
    let weights = ds.weights.as_deref();
    let wls = fit_wls(&ds.beta, &names, &rows, weights, opts.alpha)?;
    info!(
        r_squared = wls.summary.r_squared,
        adj_r_squared = wls.summary.adj_r_squared,
        "meta-regression fitted"
    );

    let r_squared_bootstrap = (opts.n_bootstrap > 0)
        .then(|| bootstrap_r2(&ds.beta, &rows, weights, opts.n_bootstrap, opts.seed))
        .flatten();

    let forest = if names.is_empty() || opts.rf_trees == 0 {
        None
    } else {
        let fit = fit_forest(&rows, &ds.beta, weights, &forest_opts)?;
        let mut importances: Vec<FeatureImportance> = names
            .iter()
            .zip(&fit.importances)
            .map(|(feature, &importance)| FeatureImportance {
                feature: feature.clone(),
                importance,
            })
            .collect();
        importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        Some(ForestSummary {
            n_trees: fit.n_trees(),
            oob_r_squared: fit.oob_r_squared,
            importances,
        })
    };

    Ok(MetaOutcome {
        design_names: names,
        wls,
        r_squared_bootstrap,
        forest,
        selected_features,
        anova,
    })
}
