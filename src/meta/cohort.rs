//! Cross-domain cohort aggregation.

use std::collections::BTreeMap;

use crate::domain::{CohortRecord, GroupStats, LogisticFit, NullKind};
use crate::fit::NullComparison;
use crate::math::{mean, median, std_dev};

/// β reference value and the band considered consistent with it.
pub const CANONICAL_BETA: f64 = 4.2;
pub const CANONICAL_BAND: (f64, f64) = (3.6, 4.8);

/// Flatten one dataset's fit and null comparisons into a cohort row.
pub fn cohort_record(
    dataset: &str,
    domain: &str,
    source: &str,
    fit: &LogisticFit,
    beta_ci: Option<[f64; 2]>,
    nulls: &NullComparison,
) -> CohortRecord {
    let delta = |kind: NullKind| {
        nulls
            .comparisons
            .iter()
            .find(|c| c.null == kind)
            .map(|c| c.delta_aic)
    };
    let strongest = nulls.strongest();
    let pass = !nulls.comparisons.is_empty() && nulls.comparisons.iter().all(|c| c.falsification_pass);

    CohortRecord {
        dataset: dataset.to_string(),
        domain: domain.to_string(),
        source: source.to_string(),
        beta: fit.beta,
        theta: fit.theta,
        beta_ci_lower: beta_ci.map(|c| c[0]),
        beta_ci_upper: beta_ci.map(|c| c[1]),
        beta_ci_width: beta_ci.map(|c| c[1] - c[0]),
        r_squared: fit.quality.r_squared,
        aic: fit.quality.aic,
        delta_aic_linear: delta(NullKind::Linear),
        delta_aic_power: delta(NullKind::Power),
        delta_aic_exponential: delta(NullKind::Exponential),
        delta_aic: strongest.map(|c| c.delta_aic),
        best_null: strongest.map(|c| c.null),
        falsification_pass: pass,
    }
}

/// Cohort-level β statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortStats {
    pub beta_mean: Option<f64>,
    pub beta_median: Option<f64>,
    pub beta_std: Option<f64>,
    pub fraction_in_band: Option<f64>,
    pub fraction_passing: Option<f64>,
    pub by_domain: BTreeMap<String, GroupStats>,
}

pub fn in_band(beta: f64, band: (f64, f64)) -> bool {
    beta >= band.0 && beta <= band.1
}

/// Fraction of `betas` inside `band`; None for an empty slice.
pub fn band_fraction(betas: &[f64], band: (f64, f64)) -> Option<f64> {
    if betas.is_empty() {
        return None;
    }
    Some(betas.iter().filter(|&&b| in_band(b, band)).count() as f64 / betas.len() as f64)
}

pub fn summarize_cohort(records: &[CohortRecord], band: (f64, f64)) -> CohortStats {
    let betas: Vec<f64> = records.iter().map(|r| r.beta).collect();
    let fraction_passing = (!records.is_empty()).then(|| {
        records.iter().filter(|r| r.falsification_pass).count() as f64 / records.len() as f64
    });

    let mut grouped: BTreeMap<String, Vec<&CohortRecord>> = BTreeMap::new();
    for rec in records {
        grouped.entry(rec.domain.clone()).or_default().push(rec);
    }
    let by_domain = grouped
        .into_iter()
        .filter_map(|(domain, recs)| {
            let b: Vec<f64> = recs.iter().map(|r| r.beta).collect();
            Some((
                domain,
                GroupStats {
                    count: recs.len(),
                    beta_mean: mean(&b)?,
                    beta_std: std_dev(&b, 1),
                    pass_count: recs.iter().filter(|r| r.falsification_pass).count(),
                },
            ))
        })
        .collect();

    CohortStats {
        beta_mean: mean(&betas),
        beta_median: median(&betas),
        beta_std: std_dev(&betas, 1),
        fraction_in_band: band_fraction(&betas, band),
        fraction_passing,
        by_domain,
    }
}
