//! Multiple-testing correction across many ΔAIC comparisons.
//!
//! ΔAIC between two nested-style models with a difference of two parameters is
//! mapped to a p-value through the χ²(2) tail: `p = exp(-ΔAIC / 2)`, and `1`
//! when ΔAIC ≤ 0. Three corrections are provided:
//!
//! - Bonferroni (family-wise, single step)
//! - Holm (family-wise, step-down)
//! - Benjamini–Hochberg (false discovery rate)
//!
//! All adjusted p-values are clipped to `[0, 1]` and every procedure preserves
//! input order in its output.

use std::cmp::Ordering;

use crate::domain::{AicThresholds, CohortRecord, CorrectedComparison, CorrectionCounts, NullKind};
use crate::math::{chi2_isf, chi2_sf};

/// Degrees of freedom used when converting ΔAIC to a p-value.
pub const AIC_DF: f64 = 2.0;

/// Outcome of one correction procedure, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub adjusted: Vec<f64>,
    pub reject: Vec<bool>,
}

impl Correction {
    pub fn rejections(&self) -> usize {
        self.reject.iter().filter(|r| **r).count()
    }
}

/// `p = P(χ²₂ > ΔAIC)`, or `1` for non-positive ΔAIC.
pub fn aic_to_p(delta_aic: f64) -> f64 {
    if !(delta_aic > 0.0) {
        return 1.0;
    }
    chi2_sf(delta_aic, AIC_DF)
}

/// ΔAIC a single comparison needs to reach significance level `alpha`.
pub fn delta_aic_threshold(alpha: f64) -> f64 {
    chi2_isf(alpha, AIC_DF)
}

/// Bonferroni: `p_adj = min(1, m p)`, reject when `p < α / m`.
pub fn bonferroni(p_values: &[f64], alpha: f64) -> Correction {
    let m = p_values.len() as f64;
    Correction {
        adjusted: p_values.iter().map(|p| (p * m).min(1.0)).collect(),
        reject: p_values.iter().map(|&p| p < alpha / m).collect(),
    }
}

/// Holm step-down.
///
/// Sorted ascending, reject `p_(i)` while `p_(i) < α / (m - i + 1)` (1-based)
/// and stop at the first failure. Adjusted p-values are the running maximum of
/// `(m - i + 1) p_(i)`.
pub fn holm(p_values: &[f64], alpha: f64) -> Correction {
    let m = p_values.len();
    let order = ascending_order(p_values);

    let mut adjusted = vec![0.0; m];
    let mut reject = vec![false; m];
    let mut running_max: f64 = 0.0;
    let mut still_rejecting = true;

    for (rank, &idx) in order.iter().enumerate() {
        let factor = (m - rank) as f64;
        let p = p_values[idx];
        running_max = running_max.max((p * factor).min(1.0));
        adjusted[idx] = running_max;

        if still_rejecting && p < alpha / factor {
            reject[idx] = true;
        } else {
            still_rejecting = false;
        }
    }

    Correction { adjusted, reject }
}

/// Benjamini–Hochberg step-up at FDR level `q`.
///
/// Reject every hypothesis up to the largest rank `i` with `p_(i) < (i / m) q`.
/// Every method here uses the same strict comparison as `p < α`.
/// q-values are the reverse running minimum of `p_(i) m / i`.
pub fn benjamini_hochberg(p_values: &[f64], q: f64) -> Correction {
    let m = p_values.len();
    let order = ascending_order(p_values);
    let m_f = m as f64;

    let cutoff_rank = order
        .iter()
        .enumerate()
        .filter(|&(rank, &idx)| p_values[idx] < (rank + 1) as f64 / m_f * q)
        .map(|(rank, _)| rank + 1)
        .max()
        .unwrap_or(0);

    let mut adjusted = vec![0.0; m];
    let mut reject = vec![false; m];
    let mut running_min: f64 = 1.0;
    for (rank, &idx) in order.iter().enumerate().rev() {
        let q_val = p_values[idx] * m_f / (rank + 1) as f64;
        running_min = running_min.min(q_val);
        adjusted[idx] = running_min.min(1.0);
        reject[idx] = rank < cutoff_rank;
    }

    Correction { adjusted, reject }
}

/// One ΔAIC hypothesis: logistic vs. `null` on `dataset`.
#[derive(Debug, Clone, PartialEq)]
pub struct AicTest {
    pub dataset: String,
    pub null: NullKind,
    pub delta_aic: f64,
}

/// Every available `(dataset, null)` ΔAIC in cohort records, in record order.
pub fn tests_from_records(records: &[CohortRecord]) -> Vec<AicTest> {
    records
        .iter()
        .flat_map(|rec| {
            NullKind::ALL.iter().filter_map(move |&kind| {
                rec.delta_aic_for(kind)
                    .filter(|d| !d.is_nan())
                    .map(|delta_aic| AicTest {
                        dataset: rec.dataset.clone(),
                        null: kind,
                        delta_aic,
                    })
            })
        })
        .collect()
}

/// Apply all three corrections to a family of ΔAIC tests.
pub fn correct_tests(
    tests: &[AicTest],
    alpha: f64,
) -> (Vec<CorrectedComparison>, CorrectionCounts, AicThresholds) {
    let p: Vec<f64> = tests.iter().map(|t| aic_to_p(t.delta_aic)).collect();
    let bonf = bonferroni(&p, alpha);
    let step_down = holm(&p, alpha);
    let bh = benjamini_hochberg(&p, alpha);

    let comparisons: Vec<CorrectedComparison> = tests
        .iter()
        .enumerate()
        .map(|(i, t)| CorrectedComparison {
            dataset: t.dataset.clone(),
            null: t.null,
            delta_aic: t.delta_aic,
            p_value: p[i],
            bonferroni_p: bonf.adjusted[i],
            holm_p: step_down.adjusted[i],
            bh_q: bh.adjusted[i],
            uncorrected_significant: p[i] < alpha,
            bonferroni_significant: bonf.reject[i],
            holm_significant: step_down.reject[i],
            bh_significant: bh.reject[i],
        })
        .collect();

    let counts = CorrectionCounts {
        uncorrected: comparisons.iter().filter(|c| c.uncorrected_significant).count(),
        bonferroni: bonf.rejections(),
        holm: step_down.rejections(),
        benjamini_hochberg: bh.rejections(),
    };

    let bonferroni_alpha = alpha / tests.len().max(1) as f64;
    let thresholds = AicThresholds {
        uncorrected_alpha: alpha,
        uncorrected_delta_aic: delta_aic_threshold(alpha),
        bonferroni_alpha,
        bonferroni_delta_aic: delta_aic_threshold(bonferroni_alpha),
    };

    (comparisons, counts, thresholds)
}

/// Indices sorted by ascending p-value; ties keep input order.
fn ascending_order(p_values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..p_values.len()).collect();
    order.sort_by(|&a, &b| p_values[a].partial_cmp(&p_values[b]).unwrap_or(Ordering::Equal));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn aic_to_p_matches_chi2_two_df() {
        assert_eq!(aic_to_p(0.0), 1.0);
        assert_eq!(aic_to_p(-3.0), 1.0);
        assert!((aic_to_p(10.0) - (-5.0_f64).exp()).abs() < 1e-12);
        assert!((delta_aic_threshold(0.05) - 5.991_464_547_107_979).abs() < 1e-9);
    }

    #[test]
    fn bonferroni_scales_and_clips() {
        let c = bonferroni(&[0.01, 0.02, 0.5], 0.05);
        assert!((c.adjusted[0] - 0.03).abs() < 1e-12);
        assert_eq!(c.adjusted[2], 1.0);
        assert_eq!(c.reject, vec![true, false, false]);
    }

    #[test]
    fn holm_reference_example() {
        // p sorted: 0.01 (×4=0.04), 0.02 (×3=0.06), 0.03 (×2=0.06), 0.04 (×1)
        let p = [0.03, 0.01, 0.04, 0.02];
        let c = holm(&p, 0.05);
        assert_eq!(c.reject, vec![false, true, false, false]);
        assert!((c.adjusted[1] - 0.04).abs() < 1e-12);
        assert!((c.adjusted[3] - 0.06).abs() < 1e-12);
        assert!((c.adjusted[0] - 0.06).abs() < 1e-12);
        assert!((c.adjusted[2] - 0.06).abs() < 1e-12);
    }

    #[test]
    fn bh_reference_example() {
        let p = [0.01, 0.04, 0.03, 0.005];
        let c = benjamini_hochberg(&p, 0.05);
        // Sorted: 0.005 < 0.0125, 0.01 < 0.025, 0.03 < 0.0375, 0.04 < 0.05
        assert_eq!(c.reject, vec![true, true, true, true]);
        assert!((c.adjusted[1] - 0.04).abs() < 1e-12);
        assert!((c.adjusted[3] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn cohort_tests_skip_missing_nulls() {
        let rec = CohortRecord {
            dataset: "a".into(),
            domain: "d".into(),
            source: "a.csv".into(),
            beta: 4.0,
            theta: 0.5,
            beta_ci_lower: None,
            beta_ci_upper: None,
            beta_ci_width: None,
            r_squared: 0.99,
            aic: -100.0,
            delta_aic_linear: Some(30.0),
            delta_aic_power: None,
            delta_aic_exponential: Some(3.0),
            delta_aic: Some(3.0),
            best_null: Some(NullKind::Exponential),
            falsification_pass: false,
        };
        let tests = tests_from_records(&[rec]);
        assert_eq!(tests.len(), 2);
        let (rows, counts, thresholds) = correct_tests(&tests, 0.05);
        assert_eq!(rows[0].null, NullKind::Linear);
        assert!(rows[0].bonferroni_significant);
        assert!(!rows[1].uncorrected_significant);
        assert_eq!(counts.bonferroni, 1);
        assert!((thresholds.bonferroni_alpha - 0.025).abs() < 1e-15);
        assert!(thresholds.bonferroni_delta_aic > thresholds.uncorrected_delta_aic);
    }

    #[test]
    fn p_equal_to_alpha_is_not_rejected_by_any_method() {
        let alpha = aic_to_p(8.0);
        let tests = vec![AicTest {
            dataset: "edge".into(),
            null: NullKind::Linear,
            delta_aic: 8.0,
        }];
        let (_, counts, _) = correct_tests(&tests, alpha);
        assert_eq!(counts.uncorrected, 0);
        assert_eq!(counts.bonferroni, 0);
        assert_eq!(counts.holm, 0);
        assert_eq!(counts.benjamini_hochberg, 0);

        assert_eq!(holm(&[0.05], 0.05).reject, vec![false]);
        assert_eq!(benjamini_hochberg(&[0.05], 0.05).reject, vec![false]);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(holm(&[], 0.05).adjusted.is_empty());
        assert!(benjamini_hochberg(&[], 0.05).reject.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn holm_rejections_are_a_prefix_of_sorted_p(p in prop::collection::vec(0.0f64..1.0, 1..40)) {
            let c = holm(&p, 0.05);
            let order = ascending_order(&p);
            let flags: Vec<bool> = order.iter().map(|&i| c.reject[i]).collect();
            let first_false = flags.iter().position(|r| !r).unwrap_or(flags.len());
            prop_assert!(flags[first_false..].iter().all(|r| !r));
        }

        #[test]
        fn bh_rejects_at_least_as_many_as_holm(p in prop::collection::vec(0.0f64..0.2, 1..40)) {
            let h = holm(&p, 0.05).rejections();
            let b = benjamini_hochberg(&p, 0.05).rejections();
            prop_assert!(b >= h);
        }

        #[test]
        fn holm_never_rejects_more_than_uncorrected_or_bonferroni(
            p in prop::collection::vec(prop_oneof![0.0f64..0.2, Just(0.05), Just(0.025)], 1..40)
        ) {
            let alpha = 0.05;
            let uncorrected = p.iter().filter(|&&v| v < alpha).count();
            let h = holm(&p, alpha).rejections();
            prop_assert!(h <= uncorrected);
            prop_assert!(h >= bonferroni(&p, alpha).rejections());
            prop_assert!(benjamini_hochberg(&p, alpha).rejections() <= uncorrected);
        }

        #[test]
        fn adjusted_p_values_are_monotone_and_bounded(p in prop::collection::vec(0.0f64..1.0, 1..40)) {
            let order = ascending_order(&p);
            for c in [holm(&p, 0.05), benjamini_hochberg(&p, 0.05), bonferroni(&p, 0.05)] {
                let sorted_adj: Vec<f64> = order.iter().map(|&i| c.adjusted[i]).collect();
                for w in sorted_adj.windows(2) {
                    prop_assert!(w[0] <= w[1] + 1e-15);
                }
                for (adj, raw) in c.adjusted.iter().zip(&p) {
                    prop_assert!(*adj >= *raw - 1e-15 && *adj <= 1.0);
                }
            }
        }
    }
}
