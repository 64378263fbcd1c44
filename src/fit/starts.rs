//! Starting-point grid for the nonlinear fit.
//!
//! Levenberg–Marquardt only finds a local minimum, so we start it from a
//! small deterministic grid and keep the best result:
//!
//! - `Θ₀ ∈ {q25(R), median(R), q75(R)}`
//! - `β₀ ∈ {1, 3.5, logit-linear slope (when y is probability-like)}`
//! - `L₀ = min(1, max y)` for probability-like y, else `max y`
//!
//! Every start is clamped into the parameter bounds.

use crate::domain::{LogisticForm, Observations};
use crate::fit::lm::Bounds;
use crate::math::{percentile, simple_regression};
use crate::models::logit;

pub const BETA_BOUNDS: (f64, f64) = (0.01, 50.0);
pub const ASYMPTOTE_BOUNDS: (f64, f64) = (0.1, 5.0);
/// Responses are clipped into `(ε, 1 - ε)` before taking logits.
pub const LOGIT_EPS: f64 = 1e-6;

const DEFAULT_BETA_START: f64 = 3.5;

/// Parameter bounds for `form` on these observations.
pub fn parameter_bounds(form: LogisticForm, obs: &Observations) -> Bounds {
    let (r_min, r_max) = obs.r_range();
    let mut lower = vec![BETA_BOUNDS.0];
    let mut upper = vec![BETA_BOUNDS.1];
    if matches!(form, LogisticForm::FreeAsymptote | LogisticForm::FixedAsymptote { .. }) {
        lower.push(r_min);
        upper.push(r_max);
    }
    if matches!(form, LogisticForm::FreeAsymptote) {
        lower.push(ASYMPTOTE_BOUNDS.0);
        upper.push(ASYMPTOTE_BOUNDS.1);
    }
    Bounds { lower, upper }
}

/// Slope of `logit(clip(y))` on `R`, if the response looks like a probability.
pub fn logit_slope_estimate(obs: &Observations) -> Option<f64> {
    if !obs.is_probability_like() {
        return None;
    }
    let z: Vec<f64> = obs
        .y()
        .iter()
        .map(|&v| logit(v.clamp(LOGIT_EPS, 1.0 - LOGIT_EPS)))
        .collect();
    let fit = simple_regression(obs.r(), &z)?;
    let slope = fit.coefficients[1];
    slope.is_finite().then_some(slope)
}

/// Deterministic list of starting vectors (free parameters only).
pub fn starting_points(form: LogisticForm, obs: &Observations, bounds: &Bounds) -> Vec<Vec<f64>> {
    let mut betas = vec![1.0, DEFAULT_BETA_START];
    if let Some(slope) = logit_slope_estimate(obs) {
        betas.push(slope);
    }

    let thetas: Vec<f64> = [25.0, 50.0, 75.0]
        .iter()
        .filter_map(|&q| percentile(obs.r(), q))
        .collect();

    let (_, y_max) = obs.y_range();
    let asymptote = if obs.is_probability_like() { y_max.min(1.0) } else { y_max };

    let mut out: Vec<Vec<f64>> = Vec::new();
    for &b in &betas {
        match form {
            LogisticForm::FixedThreshold { .. } => out.push(vec![b]),
            LogisticForm::FixedAsymptote { .. } => {
                for &t in &thetas {
                    out.push(vec![b, t]);
                }
            }
            LogisticForm::FreeAsymptote => {
                for &t in &thetas {
                    out.push(vec![b, t, asymptote]);
                }
            }
        }
    }

    for x in &mut out {
        bounds.clamp(x);
    }
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs() -> Observations {
        let r: Vec<f64> = (0..11).map(|i| i as f64 / 10.0).collect();
        let y: Vec<f64> = r.iter().map(|v| 1.0 / (1.0 + (-8.0 * (v - 0.5)).exp())).collect();
        Observations::new(r, y).unwrap()
    }

    #[test]
    fn starts_lie_within_bounds() {
        let o = obs();
        let form = LogisticForm::FreeAsymptote;
        let b = parameter_bounds(form, &o);
        let starts = starting_points(form, &o, &b);
        assert_eq!(starts.len(), 9);
        for s in starts {
            for j in 0..3 {
                assert!(s[j] >= b.lower[j] && s[j] <= b.upper[j]);
            }
        }
    }

    #[test]
    fn logit_slope_tracks_true_steepness() {
        let slope = logit_slope_estimate(&obs()).unwrap();
        assert!((slope - 8.0).abs() < 1e-6, "slope={slope}");
    }

    #[test]
    fn fixed_threshold_only_varies_beta() {
        let o = obs();
        let form = LogisticForm::FixedThreshold {
            theta: 0.5,
            asymptote: 1.0,
        };
        let b = parameter_bounds(form, &o);
        assert_eq!(b.lower.len(), 1);
        assert!(starting_points(form, &o, &b).iter().all(|s| s.len() == 1));
    }
}
