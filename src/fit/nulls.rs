//! Smooth null models fitted to the same observations as the logistic curve.
//!
//! - linear: `y = a R + b` (OLS)
//! - power-law: `ln y = ln A + k ln R` (requires every `R > 0`)
//! - exponential: `ln y = ln A + c R`
//!
//! Log-space fits clip `y` to at least `LOG_FLOOR`. Quality is always measured
//! on the observed `y`, with `k = 2`.

use crate::domain::{NullFit, NullKind, NullModel, Observations};
use crate::error::FitError;
use crate::fit::fitter::quality;
use crate::math::simple_regression;
use crate::models::predict_null;

const LOG_FLOOR: f64 = 1e-9;
const NULL_PARAMS: usize = 2;

/// Fit one null family.
///
/// Returns `InvalidInput` when the family is not defined for these data
/// (power-law with non-positive `R`); callers record that as skipped.
pub fn fit_null(kind: NullKind, obs: &Observations) -> Result<NullFit, FitError> {
    let r = obs.r();
    let y = obs.y();

    let model = match kind {
        NullKind::Linear => {
            let fit = regress(r, y, kind)?;
            NullModel::Linear {
                slope: fit[1],
                intercept: fit[0],
            }
        }
        NullKind::Power => {
            if r.iter().any(|&v| v <= 0.0) {
                return Err(FitError::InvalidInput(
                    "power-law null needs every R > 0".to_string(),
                ));
            }
            let ln_r: Vec<f64> = r.iter().map(|v| v.ln()).collect();
            let fit = regress(&ln_r, &log_clipped(y), kind)?;
            NullModel::Power {
                amplitude: fit[0].exp(),
                exponent: fit[1],
            }
        }
        NullKind::Exponential => {
            let fit = regress(r, &log_clipped(y), kind)?;
            NullModel::Exponential {
                amplitude: fit[0].exp(),
                rate: fit[1],
            }
        }
    };

    let predicted: Vec<f64> = r.iter().map(|&v| predict_null(&model, v)).collect();
    if predicted.iter().any(|v| !v.is_finite()) {
        return Err(FitError::Numerical(format!(
            "{} null produced non-finite predictions",
            kind.display_name()
        )));
    }
    Ok(NullFit {
        model,
        quality: quality(y, &predicted, NULL_PARAMS),
    })
}

fn log_clipped(y: &[f64]) -> Vec<f64> {
    y.iter().map(|v| v.max(LOG_FLOOR).ln()).collect()
}

fn regress(x: &[f64], z: &[f64], kind: NullKind) -> Result<[f64; 2], FitError> {
    let fit = simple_regression(x, z).ok_or_else(|| {
        FitError::Numerical(format!("{} null regression failed", kind.display_name()))
    })?;
    Ok([fit.coefficients[0], fit.coefficients[1]])
}
