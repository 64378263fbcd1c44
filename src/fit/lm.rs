//! Bounded Levenberg–Marquardt for the logistic curve.
//!
//! Each iteration solves
//!
//! ```text
//! (JᵀJ + λ diag(JᵀJ)) δ = Jᵀ r
//! ```
//!
//! projects `x + δ` onto the box bounds, and accepts the step only if SSE
//! decreases. Accepted steps shrink λ by 10, rejected steps grow it by 10.
//!
//! Converged when any of:
//! - SSE is effectively zero
//! - the relative SSE decrease of an accepted step is below `ftol`
//! - an accepted step is below `xtol` relative to the parameter norm
//! - λ grows past `LAMBDA_MAX` (no descent direction left inside the box)

use nalgebra::{DMatrix, DVector};

use crate::domain::LogisticForm;
use crate::error::FitError;
use crate::models::{fill_jacobian_row, predict};

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e15;
const SSE_ZERO: f64 = 1e-30;

/// Box constraints on the free parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn clamp(&self, x: &mut [f64]) {
        for (j, v) in x.iter_mut().enumerate() {
            *v = v.clamp(self.lower[j], self.upper[j]);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            ftol: 1e-10,
            xtol: 1e-10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LmSolution {
    pub params: Vec<f64>,
    pub sse: f64,
    pub iterations: usize,
    /// `s² (JᵀJ)⁺` at the solution, `s² = SSE / (n - p)`. None when `n <= p`.
    pub covariance: Option<DMatrix<f64>>,
}

/// Minimise `Σ (y_i - f(R_i; x))²` from `start` inside `bounds`.
pub fn levenberg_marquardt(
    form: LogisticForm,
    r: &[f64],
    y: &[f64],
    start: &[f64],
    bounds: &Bounds,
    opts: LmOptions,
) -> Result<LmSolution, FitError> {
    let n = r.len();
    let p = form.param_count();
    if start.len() != p || bounds.lower.len() != p || bounds.upper.len() != p {
        return Err(FitError::InvalidInput(format!(
            "expected {p} parameters for {form:?}"
        )));
    }

    let mut x = start.to_vec();
    bounds.clamp(&mut x);
    let mut sse = sum_squares(form, r, y, &x);
    if !sse.is_finite() {
        return Err(FitError::Numerical("non-finite SSE at starting point".to_string()));
    }

    let mut lambda = LAMBDA_INIT;
    let mut jac = DMatrix::<f64>::zeros(n, p);
    let mut resid = DVector::<f64>::zeros(n);
    let mut row = vec![0.0; p];
    let mut converged = sse <= SSE_ZERO;
    let mut iterations = 0;

    while !converged && iterations < opts.max_iterations {
        iterations += 1;

        for i in 0..n {
            fill_jacobian_row(form, r[i], &x, &mut row);
            for j in 0..p {
                jac[(i, j)] = row[j];
            }
            resid[i] = y[i] - predict(form, r[i], &x);
        }
        let jtj = jac.transpose() * &jac;
        let grad = jac.transpose() * &resid;

        let mut damped = jtj.clone();
        for j in 0..p {
            damped[(j, j)] += lambda * jtj[(j, j)].max(1e-12);
        }

        let Some(step) = damped.lu().solve(&grad) else {
            lambda *= 10.0;
            converged = lambda > LAMBDA_MAX;
            continue;
        };

        let mut candidate: Vec<f64> = x.iter().zip(step.iter()).map(|(a, d)| a + d).collect();
        bounds.clamp(&mut candidate);
        let sse_new = sum_squares(form, r, y, &candidate);

        if sse_new.is_finite() && sse_new < sse {
            let step_norm = x
                .iter()
                .zip(&candidate)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            let x_norm = candidate.iter().map(|v| v * v).sum::<f64>().sqrt();
            let rel_decrease = (sse - sse_new) / sse.max(SSE_ZERO);

            x = candidate;
            sse = sse_new;
            lambda = (lambda / 10.0).max(LAMBDA_MIN);

            converged = sse <= SSE_ZERO
                || rel_decrease <= opts.ftol
                || step_norm <= opts.xtol * (x_norm + opts.xtol);
        } else {
            lambda *= 10.0;
            converged = lambda > LAMBDA_MAX;
        }
    }

    if !converged {
        return Err(FitError::NotConverged { iterations });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(FitError::Numerical("non-finite parameters after optimisation".to_string()));
    }

    let covariance = parameter_covariance(form, r, &x, sse);
    Ok(LmSolution {
        params: x,
        sse,
        iterations,
        covariance,
    })
}

fn sum_squares(form: LogisticForm, r: &[f64], y: &[f64], x: &[f64]) -> f64 {
    r.iter()
        .zip(y)
        .map(|(&ri, &yi)| {
            let e = yi - predict(form, ri, x);
            e * e
        })
        .sum()
}

/// Asymptotic covariance `s² (JᵀJ)⁺` at `x`.
pub fn parameter_covariance(form: LogisticForm, r: &[f64], x: &[f64], sse: f64) -> Option<DMatrix<f64>> {
    let n = r.len();
    let p = form.param_count();
    if n <= p {
        return None;
    }
    let mut jac = DMatrix::<f64>::zeros(n, p);
    let mut row = vec![0.0; p];
    for (i, &ri) in r.iter().enumerate() {
        fill_jacobian_row(form, ri, x, &mut row);
        for j in 0..p {
            jac[(i, j)] = row[j];
        }
    }
    let jtj = jac.transpose() * &jac;
    let inv = jtj.pseudo_inverse(1e-12).ok()?;
    let s2 = sse / (n - p) as f64;
    let cov = inv * s2;
    if cov.iter().all(|v| v.is_finite()) {
        Some(cov)
    } else {
        None
    }
}
