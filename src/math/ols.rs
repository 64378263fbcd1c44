//! Weighted least squares solver.
//!
//! Every linear model in this crate reduces to:
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T b)^2
//! ```
//!
//! - the logit-linear logistic fit (`logit(y) ~ 1 + R`)
//! - the linear / power-law / exponential null models (after log transforms)
//! - the cross-dataset meta-regression (inverse-variance weights)
//!
//! Implementation choices:
//! - We scale rows by `sqrt(w_i)` and solve an ordinary least squares problem.
//! - We use SVD so tall design matrices solve robustly.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - The coefficient covariance is `s^2 (X^T W X)^+` with
//!   `s^2 = Σ w r^2 / (n - p)`, which is what the inference tables need.

use nalgebra::{DMatrix, DVector};

/// Result of a (weighted) least squares fit with inference quantities.
#[derive(Debug, Clone)]
pub struct LeastSquaresFit {
    /// Coefficients in design-column order.
    pub coefficients: Vec<f64>,
    /// Coefficient covariance matrix `s^2 (X^T W X)^+`.
    pub covariance: DMatrix<f64>,
    /// Weighted residual sum of squares.
    pub sse: f64,
    /// Residual variance estimate `sse / (n - p)`.
    pub residual_variance: f64,
    /// Residual degrees of freedom `n - p`.
    pub dof: usize,
}

impl LeastSquaresFit {
    /// Standard error of coefficient `j` (None when the variance is not usable).
    pub fn std_error(&self, j: usize) -> Option<f64> {
        let v = self.covariance[(j, j)];
        if v.is_finite() && v >= 0.0 { Some(v.sqrt()) } else { None }
    }
}

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Fit `y ~ X b` with optional per-row weights and return coefficients plus covariance.
///
/// Returns `None` when the problem is underdetermined (`n <= p`), a weight is
/// invalid, or the solve fails.
pub fn weighted_least_squares(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    weights: Option<&[f64]>,
) -> Option<LeastSquaresFit> {
    let n = x.nrows();
    let p = x.ncols();
    if n != y.len() || n <= p || p == 0 {
        return None;
    }
    if let Some(w) = weights {
        if w.len() != n || w.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return None;
        }
    }

    let mut xw = x.clone();
    let mut yw = y.clone();
    if let Some(w) = weights {
        for i in 0..n {
            let sw = w[i].sqrt();
            for j in 0..p {
                xw[(i, j)] *= sw;
            }
            yw[i] *= sw;
        }
    }

    let beta = solve_least_squares(&xw, &yw)?;
    let resid = &yw - &xw * &beta;
    let sse = resid.dot(&resid);
    if !sse.is_finite() {
        return None;
    }

    let dof = n - p;
    let residual_variance = sse / dof as f64;
    let xtx = xw.transpose() * &xw;
    let xtx_inv = xtx.pseudo_inverse(1e-12).ok()?;
    let covariance = xtx_inv * residual_variance;

    Some(LeastSquaresFit {
        coefficients: beta.iter().copied().collect(),
        covariance,
        sse,
        residual_variance,
        dof,
    })
}

/// Unweighted simple regression `y = b0 + b1 x`; coefficients are `[intercept, slope]`.
pub fn simple_regression(x: &[f64], y: &[f64]) -> Option<LeastSquaresFit> {
    if x.len() != y.len() {
        return None;
    }
    let design = DMatrix::from_fn(x.len(), 2, |i, j| if j == 0 { 1.0 } else { x[i] });
    let target = DVector::from_column_slice(y);
    weighted_least_squares(&design, &target, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn simple_regression_matches_closed_form() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.1, 3.9, 6.2, 7.8, 10.1];
        let fit = simple_regression(&x, &y).unwrap();

        // Closed form: slope = Sxy / Sxx.
        let xm = 3.0;
        let ym = y.iter().sum::<f64>() / 5.0;
        let sxy: f64 = x.iter().zip(&y).map(|(a, b)| (a - xm) * (b - ym)).sum();
        let sxx: f64 = x.iter().map(|a| (a - xm) * (a - xm)).sum();
        let slope = sxy / sxx;
        assert!((fit.coefficients[1] - slope).abs() < 1e-10);
        assert!((fit.coefficients[0] - (ym - slope * xm)).abs() < 1e-10);

        // Var(slope) = s^2 / Sxx.
        let se = fit.std_error(1).unwrap();
        assert!((se * se - fit.residual_variance / sxx).abs() < 1e-10);
        assert_eq!(fit.dof, 3);
    }

    #[test]
    fn weighted_fit_rejects_bad_weights() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        assert!(weighted_least_squares(&x, &y, Some(&[1.0, 0.0, 1.0])).is_none());
        assert!(weighted_least_squares(&x, &y, Some(&[1.0, 1.0])).is_none());
    }

    #[test]
    fn underdetermined_system_is_rejected() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 1.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0]);
        assert!(weighted_least_squares(&x, &y, None).is_none());
    }
}
