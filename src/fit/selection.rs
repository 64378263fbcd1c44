//! Logistic vs. null model comparison using AIC with a falsification guard.
//!
//! For each requested null family we compute:
//! - ΔAIC = AIC_null - AIC_logistic
//! - ΔBIC = BIC_null - BIC_logistic
//! - ΔR² = R²_logistic - R²_null
//!
//! A comparison passes when `ΔAIC > min_delta_aic` and the logistic R² reaches
//! `min_r_squared`. Families that cannot be fitted are skipped, not fatal.

use tracing::warn;

use crate::domain::{
    ComparisonResult, FalsificationGuard, LogisticFit, NullFit, NullKind, NullModelSet, Observations,
    SkippedNull,
};
use crate::fit::nulls::fit_null;

/// Output of fitting every requested null and comparing against the logistic fit.
#[derive(Debug, Clone)]
pub struct NullComparison {
    pub nulls: NullModelSet,
    pub comparisons: Vec<ComparisonResult>,
    pub skipped: Vec<SkippedNull>,
}

impl NullComparison {
    /// Comparison against the best-fitting null (lowest ΔAIC).
    pub fn strongest(&self) -> Option<&ComparisonResult> {
        self.comparisons
            .iter()
            .min_by(|a, b| a.delta_aic.total_cmp(&b.delta_aic))
    }
}

/// Compare one logistic fit against one null fit.
pub fn compare_models(
    logistic: &LogisticFit,
    null: &NullFit,
    guard: FalsificationGuard,
) -> ComparisonResult {
    let delta_aic = null.quality.aic - logistic.quality.aic;
    let delta_bic = null.quality.bic - logistic.quality.bic;
    let delta_r_squared = logistic.quality.r_squared - null.quality.r_squared;
    ComparisonResult {
        null: null.model.kind(),
        delta_aic,
        delta_bic,
        delta_r_squared,
        falsification_pass: delta_aic > guard.min_delta_aic
            && logistic.quality.r_squared >= guard.min_r_squared,
    }
}

/// Fit each null family in `kinds` and compare it with `logistic`.
pub fn compare_against_nulls(
    logistic: &LogisticFit,
    obs: &Observations,
    kinds: &[NullKind],
    guard: FalsificationGuard,
) -> NullComparison {
    let mut nulls = NullModelSet::default();
    let mut comparisons = Vec::with_capacity(kinds.len());
    let mut skipped = Vec::new();

    for &kind in kinds {
        match fit_null(kind, obs) {
            Ok(fit) => {
                comparisons.push(compare_models(logistic, &fit, guard));
                nulls.insert(fit);
            }
            Err(e) => {
                warn!(null = kind.display_name(), error = %e, "null model skipped");
                skipped.push(SkippedNull {
                    kind,
                    reason: e.to_string(),
                });
            }
        }
    }

    NullComparison {
        nulls,
        comparisons,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::fitter::{fit_observations, FitOptions};

    fn sigmoid_obs() -> Observations {
        let r: Vec<f64> = (0..40).map(|i| 0.05 + i as f64 * 0.025).collect();
        let y: Vec<f64> = r
            .iter()
            .enumerate()
            .map(|(i, v)| 1.0 / (1.0 + (-12.0 * (v - 0.55)).exp()) + 0.005 * ((i * 13 % 7) as f64 - 3.0) / 3.0)
            .collect();
        Observations::new(r, y).unwrap()
    }

    #[test]
    fn sigmoid_data_beats_every_null() {
        let obs = sigmoid_obs();
        let fit = fit_observations(&obs, &FitOptions::default()).unwrap();
        let cmp = compare_against_nulls(&fit, &obs, &NullKind::ALL, FalsificationGuard::default());
        assert_eq!(cmp.comparisons.len(), 3);
        assert!(cmp.skipped.is_empty());
        for c in &cmp.comparisons {
            assert!(c.delta_aic > 10.0, "{:?}", c);
            assert!(c.falsification_pass);
        }
        assert!(cmp.strongest().is_some());
    }

    #[test]
    fn power_null_is_skipped_when_r_touches_zero() {
        let r: Vec<f64> = (0..20).map(|i| i as f64 * 0.05).collect();
        let y: Vec<f64> = r.iter().map(|v| 1.0 / (1.0 + (-10.0 * (v - 0.5)).exp())).collect();
        let obs = Observations::new(r, y).unwrap();
        let fit = fit_observations(&obs, &FitOptions::default()).unwrap();
        let cmp = compare_against_nulls(&fit, &obs, &NullKind::ALL, FalsificationGuard::default());
        assert_eq!(cmp.skipped.len(), 1);
        assert_eq!(cmp.skipped[0].kind, NullKind::Power);
        assert!(cmp.nulls.power.is_none());
        assert!(cmp.nulls.linear.is_some());
    }

    #[test]
    fn guard_requires_strict_delta_and_r2_floor() {
        let obs = sigmoid_obs();
        let fit = fit_observations(&obs, &FitOptions::default()).unwrap();
        let null = fit_null(NullKind::Linear, &obs).unwrap();
        let delta = null.quality.aic - fit.quality.aic;

        let at_threshold = FalsificationGuard {
            min_delta_aic: delta,
            min_r_squared: 0.0,
        };
        assert!(!compare_models(&fit, &null, at_threshold).falsification_pass);

        let strict_r2 = FalsificationGuard {
            min_delta_aic: 0.0,
            min_r_squared: 1.1,
        };
        assert!(!compare_models(&fit, &null, strict_r2).falsification_pass);
    }
}
