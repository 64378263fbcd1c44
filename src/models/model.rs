//! Model evaluation for the logistic threshold curve and its null models.
//!
//! The fitter relies on two primitive operations:
//! - predict y(R) given the free parameters (for residuals/quality)
//! - fill a Jacobian row for the free parameters (for Levenberg–Marquardt)
//!
//! Free parameters are ordered `[β, Θ, L]` and truncated per `LogisticForm`.

use crate::domain::{LogisticForm, NullModel};

/// Numerically stable logistic function `1 / (1 + exp(-z))`.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(p / (1 - p))`.
pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Predict `y(R) = L σ(β(R - Θ))`.
pub fn predict(form: LogisticForm, r: f64, params: &[f64]) -> f64 {
    let (beta, theta, asymptote) = form.unpack(params);
    asymptote * sigmoid(beta * (r - theta))
}

/// Fill the partial derivatives of `predict` with respect to the free parameters.
///
/// # Panics
/// Panics if `out.len() < form.param_count()` or `params` is shorter than the
/// free parameter count.
pub fn fill_jacobian_row(form: LogisticForm, r: f64, params: &[f64], out: &mut [f64]) {
    let (beta, theta, asymptote) = form.unpack(params);
    let s = sigmoid(beta * (r - theta));
    let ds = asymptote * s * (1.0 - s);
    match form {
        LogisticForm::FreeAsymptote => {
            out[0] = ds * (r - theta);
            out[1] = -ds * beta;
            out[2] = s;
        }
        LogisticForm::FixedAsymptote { .. } => {
            out[0] = ds * (r - theta);
            out[1] = -ds * beta;
        }
        LogisticForm::FixedThreshold { .. } => {
            out[0] = ds * (r - theta);
        }
    }
}

/// Predict a null model at `R`.
pub fn predict_null(model: &NullModel, r: f64) -> f64 {
    match *model {
        NullModel::Linear { slope, intercept } => slope * r + intercept,
        NullModel::Power { amplitude, exponent } => amplitude * r.powf(exponent),
        NullModel::Exponential { amplitude, rate } => amplitude * (rate * r).exp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_is_half_asymptote_at_threshold() {
        let y = predict(LogisticForm::FreeAsymptote, 0.4, &[6.0, 0.4, 0.8]);
        assert!((y - 0.4).abs() < 1e-12);
    }

    #[test]
    fn sigmoid_is_stable_for_large_arguments() {
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert!((logit(sigmoid(2.5)) - 2.5).abs() < 1e-10);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let form = LogisticForm::FreeAsymptote;
        let params = [4.2, 0.5, 0.9];
        let r = 0.63;
        let mut row = [0.0; 3];
        fill_jacobian_row(form, r, &params, &mut row);

        let h = 1e-6;
        for j in 0..3 {
            let mut up = params;
            let mut down = params;
            up[j] += h;
            down[j] -= h;
            let fd = (predict(form, r, &up) - predict(form, r, &down)) / (2.0 * h);
            assert!((fd - row[j]).abs() < 1e-6, "param {j}: fd={fd} analytic={}", row[j]);
        }
    }

    #[test]
    fn null_models_evaluate() {
        let lin = NullModel::Linear {
            slope: 2.0,
            intercept: 1.0,
        };
        assert_eq!(predict_null(&lin, 3.0), 7.0);
        let pow = NullModel::Power {
            amplitude: 2.0,
            exponent: 2.0,
        };
        assert_eq!(predict_null(&pow, 3.0), 18.0);
        let exp = NullModel::Exponential {
            amplitude: 1.0,
            rate: 0.0,
        };
        assert_eq!(predict_null(&exp, 3.0), 1.0);
    }
}
