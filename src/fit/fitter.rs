//! Logistic threshold fitting for a single dataset.
//!
//! Given observations `(R_i, y_i)` we estimate
//!
//! ```text
//! y(R) = L / (1 + exp(-β (R - Θ)))
//! ```
//!
//! by one of two methods:
//! - `Nonlinear`: bounded Levenberg–Marquardt from a grid of starts (parallel),
//!   keeping the lowest SSE (ties broken by start index)
//! - `LogitLinear`: OLS of `logit(y)` on `R` over the rows strictly inside
//!   `(ε, 1 - ε)`, with `Θ = -a/b` and its standard error from the delta method
//!
//! Quality (R², AIC, BIC, RMSE) is always computed against the observed `y`.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::debug;

use crate::domain::{
    AsymptoteMode, FitMethod, FitQuality, LogisticFit, LogisticForm, Observations, MIN_POINTS,
};
use crate::error::FitError;
use crate::fit::lm::{levenberg_marquardt, LmOptions, LmSolution};
use crate::fit::starts::{parameter_bounds, starting_points, LOGIT_EPS};
use crate::math::{aic, bic, r_squared, rmse, sse, weighted_least_squares, Z_95};
use crate::models::{logit, predict};

/// Spread below which `R` (or `y`) counts as constant.
const DEGENERATE_SPAN: f64 = 1e-12;

/// Fitting options for one dataset.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub method: FitMethod,
    /// Ignored by `LogitLinear`, which always uses `L = 1`.
    pub asymptote: AsymptoteMode,
    /// Hold Θ and fit β alone.
    pub fixed_theta: Option<f64>,
    pub max_iterations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            method: FitMethod::Nonlinear,
            asymptote: AsymptoteMode::Free,
            fixed_theta: None,
            max_iterations: 10_000,
        }
    }
}

impl FitOptions {
    /// Curve parameterisation implied by these options.
    pub fn form(&self) -> LogisticForm {
        let free_l = self.method == FitMethod::Nonlinear && self.asymptote == AsymptoteMode::Free;
        match (self.fixed_theta, free_l) {
            (Some(theta), _) => LogisticForm::FixedThreshold {
                theta,
                asymptote: 1.0,
            },
            (None, true) => LogisticForm::FreeAsymptote,
            (None, false) => LogisticForm::FixedAsymptote { asymptote: 1.0 },
        }
    }
}

/// Fit the logistic curve to raw slices (non-finite pairs are dropped).
pub fn fit_logistic(r: &[f64], y: &[f64], opts: &FitOptions) -> Result<LogisticFit, FitError> {
    let obs = Observations::new(r.to_vec(), y.to_vec())?;
    fit_observations(&obs, opts)
}

/// Fit the logistic curve to validated observations.
pub fn fit_observations(obs: &Observations, opts: &FitOptions) -> Result<LogisticFit, FitError> {
    check_variation(obs)?;
    if let Some(theta) = opts.fixed_theta {
        if !theta.is_finite() {
            return Err(FitError::InvalidInput(format!("fixed threshold must be finite, got {theta}")));
        }
    }

    let fit = match opts.method {
        FitMethod::Nonlinear => fit_nonlinear(obs, opts)?,
        FitMethod::LogitLinear => fit_logit_linear(obs, opts)?,
    };

    let core = [fit.beta, fit.theta, fit.asymptote, fit.quality.r_squared, fit.quality.aic];
    if core.iter().any(|v| !v.is_finite()) {
        return Err(FitError::Numerical("fit produced non-finite estimates".to_string()));
    }
    Ok(fit)
}

fn check_variation(obs: &Observations) -> Result<(), FitError> {
    let (r_min, r_max) = obs.r_range();
    if r_max - r_min < DEGENERATE_SPAN {
        return Err(FitError::Degenerate("R has no variation".to_string()));
    }
    let (y_min, y_max) = obs.y_range();
    if y_max - y_min < DEGENERATE_SPAN {
        return Err(FitError::Degenerate("response has no variation".to_string()));
    }
    Ok(())
}

fn fit_nonlinear(obs: &Observations, opts: &FitOptions) -> Result<LogisticFit, FitError> {
    let form = opts.form();
    let bounds = parameter_bounds(form, obs);
    let starts = starting_points(form, obs, &bounds);
    let lm_opts = LmOptions {
        max_iterations: opts.max_iterations,
        ..LmOptions::default()
    };

    let results: Vec<(usize, Result<LmSolution, FitError>)> = starts
        .par_iter()
        .enumerate()
        .map(|(idx, x0)| (idx, levenberg_marquardt(form, obs.r(), obs.y(), x0, &bounds, lm_opts)))
        .collect();

    // Deterministic selection: minimum SSE, ties by start index.
    let mut best: Option<(usize, LmSolution)> = None;
    let mut first_err: Option<FitError> = None;
    for (idx, res) in results {
        match res {
            Ok(sol) => {
                let better = match &best {
                    None => true,
                    Some((bi, b)) => sol.sse < b.sse || (sol.sse == b.sse && idx < *bi),
                };
                if better {
                    best = Some((idx, sol));
                }
            }
            Err(e) => {
                debug!(start = idx, error = %e, "start failed");
                first_err.get_or_insert(e);
            }
        }
    }

    let Some((start_idx, sol)) = best else {
        return Err(first_err.unwrap_or_else(|| FitError::Numerical("no starting points".to_string())));
    };
    debug!(start = start_idx, sse = sol.sse, iterations = sol.iterations, "selected start");

    let (beta, theta, asymptote) = form.unpack(&sol.params);
    let predicted: Vec<f64> = obs.r().iter().map(|&r| predict(form, r, &sol.params)).collect();
    let quality = quality(obs.y(), &predicted, form.param_count());

    let covariance = sol.covariance.map(|c| to_rows(&c));
    let beta_se = covariance.as_ref().and_then(|c| std_error(c, 0));
    let theta_se = match form {
        LogisticForm::FixedThreshold { .. } => None,
        _ => covariance.as_ref().and_then(|c| std_error(c, 1)),
    };

    Ok(LogisticFit {
        method: FitMethod::Nonlinear,
        form,
        beta,
        theta,
        asymptote,
        beta_se,
        theta_se,
        beta_ci_95: beta_se.map(|se| normal_ci(beta, se)),
        theta_ci_95: theta_se.map(|se| normal_ci(theta, se)),
        covariance,
        quality,
        iterations: sol.iterations,
    })
}

fn fit_logit_linear(obs: &Observations, opts: &FitOptions) -> Result<LogisticFit, FitError> {
    if !obs.is_probability_like() {
        return Err(FitError::InvalidInput(
            "logit-linear fitting needs responses in [0, 1]; rescale first (e.g. --normalize)".to_string(),
        ));
    }
    if opts.asymptote == AsymptoteMode::Free {
        debug!("logit-linear fit holds the asymptote at 1");
    }

    // Rows at the rails carry no slope information once clipped; keep them out
    // of the regression and score the fit against every row afterwards.
    let (r, z): (Vec<f64>, Vec<f64>) = obs
        .r()
        .iter()
        .zip(obs.y())
        .filter(|&(_, &v)| v > LOGIT_EPS && v < 1.0 - LOGIT_EPS)
        .map(|(&r, &v)| (r, logit(v)))
        .unzip();
    let n = r.len();
    if n < MIN_POINTS {
        return Err(FitError::InsufficientData { needed: MIN_POINTS, got: n });
    }
    if n < obs.len() {
        debug!(dropped = obs.len() - n, kept = n, "logit-linear fit skips saturated rows");
    }
    let target = DVector::from_column_slice(&z);
    let form = opts.form();

    let (beta, theta, beta_se, theta_se, covariance) = match form {
        LogisticForm::FixedThreshold { theta, .. } => {
            // logit(y) = β (R - Θ): regression through the origin on the shifted R.
            let design = DMatrix::from_fn(n, 1, |i, _| r[i] - theta);
            let fit = weighted_least_squares(&design, &target, None)
                .ok_or_else(|| FitError::Numerical("logit regression failed".to_string()))?;
            let beta = fit.coefficients[0];
            let se = fit.std_error(0);
            let cov = se.map(|s| vec![vec![s * s]]);
            (beta, theta, se, None, cov)
        }
        _ => {
            let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { r[i] });
            let fit = weighted_least_squares(&design, &target, None)
                .ok_or_else(|| FitError::Numerical("logit regression failed".to_string()))?;
            let a = fit.coefficients[0];
            let b = fit.coefficients[1];
            if b.abs() < DEGENERATE_SPAN {
                return Err(FitError::Degenerate(
                    "logit slope is zero; threshold is undefined".to_string(),
                ));
            }
            let theta = -a / b;

            // Delta method for Θ = -a/b: ∇Θ = [-1/b, a/b²] over (a, b).
            let c = &fit.covariance;
            let g = [-1.0 / b, a / (b * b)];
            let var_theta = g[0] * g[0] * c[(0, 0)] + 2.0 * g[0] * g[1] * c[(0, 1)] + g[1] * g[1] * c[(1, 1)];
            let cov_beta_theta = g[0] * c[(0, 1)] + g[1] * c[(1, 1)];
            let var_beta = c[(1, 1)];

            let beta_se = (var_beta.is_finite() && var_beta >= 0.0).then(|| var_beta.sqrt());
            let theta_se = (var_theta.is_finite() && var_theta >= 0.0).then(|| var_theta.sqrt());
            let cov = vec![vec![var_beta, cov_beta_theta], vec![cov_beta_theta, var_theta]];
            (b, theta, beta_se, theta_se, Some(cov))
        }
    };

    let params: Vec<f64> = match form {
        LogisticForm::FixedThreshold { .. } => vec![beta],
        _ => vec![beta, theta],
    };
    let predicted: Vec<f64> = obs.r().iter().map(|&r| predict(form, r, &params)).collect();
    let quality = quality(obs.y(), &predicted, form.param_count());

    Ok(LogisticFit {
        method: FitMethod::LogitLinear,
        form,
        beta,
        theta,
        asymptote: 1.0,
        beta_se,
        theta_se,
        beta_ci_95: beta_se.map(|se| normal_ci(beta, se)),
        theta_ci_95: theta_se.map(|se| normal_ci(theta, se)),
        covariance,
        quality,
        iterations: 0,
    })
}

/// Quality diagnostics of predictions against observations with `k` estimated parameters.
pub fn quality(observed: &[f64], predicted: &[f64], k: usize) -> FitQuality {
    let n = observed.len();
    let sse = sse(observed, predicted);
    FitQuality {
        n,
        k,
        sse,
        rmse: rmse(n, sse),
        r_squared: r_squared(observed, predicted),
        aic: aic(n, sse, k),
        bic: bic(n, sse, k),
    }
}

fn normal_ci(estimate: f64, se: f64) -> [f64; 2] {
    [estimate - Z_95 * se, estimate + Z_95 * se]
}

fn to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows()).map(|i| m.row(i).iter().copied().collect()).collect()
}

fn std_error(cov: &[Vec<f64>], j: usize) -> Option<f64> {
    let v = *cov.get(j)?.get(j)?;
    (v.is_finite() && v >= 0.0).then(|| v.sqrt())
}
