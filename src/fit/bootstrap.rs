//! Nonparametric bootstrap for β and Θ.
//!
//! Each resample draws `n` rows with replacement and refits with the same
//! options. Resample `i` uses its own `StdRng` seeded from `(seed, i)`, so the
//! result is identical for a given seed regardless of thread scheduling.
//! Failed refits are discarded; intervals are the 2.5/97.5 percentiles of the
//! successful estimates.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::{BootstrapSummary, CiSource, LogisticFit, Observations};
use crate::error::FitError;
use crate::fit::fitter::{fit_observations, FitOptions};
use crate::math::{mean, percentile, std_dev};

/// Below this many successful resamples the percentile interval is not trusted.
pub const MIN_SUCCESSFUL: usize = 10;

/// Estimates from the successful resamples, in resample order.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapSamples {
    pub requested: usize,
    pub betas: Vec<f64>,
    pub thetas: Vec<f64>,
}

impl BootstrapSamples {
    pub fn successful(&self) -> usize {
        self.betas.len()
    }

    /// Percentile summary, or None when nothing converged.
    pub fn summary(&self) -> Option<BootstrapSummary> {
        let n_successful = self.successful();
        if n_successful == 0 {
            return None;
        }
        let beta_mean = mean(&self.betas)?;
        let beta_std = std_dev(&self.betas, 1).unwrap_or(0.0);
        let beta_ci_95 = [percentile(&self.betas, 2.5)?, percentile(&self.betas, 97.5)?];
        let theta_ci_95 = [percentile(&self.thetas, 2.5)?, percentile(&self.thetas, 97.5)?];
        let beta_ci_width = beta_ci_95[1] - beta_ci_95[0];
        let nonzero_mean = beta_mean.abs() > f64::EPSILON;

        Some(BootstrapSummary {
            n_requested: self.requested,
            n_successful,
            convergence_rate: n_successful as f64 / self.requested.max(1) as f64,
            beta_mean,
            beta_std,
            beta_ci_95,
            theta_ci_95,
            beta_ci_width,
            beta_ci_width_relative: nonzero_mean.then(|| beta_ci_width / beta_mean.abs()),
            coefficient_of_variation: nonzero_mean.then(|| beta_std / beta_mean.abs()),
        })
    }
}

/// Seed for resample `index` derived from the run seed.
pub fn resample_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Run `n_boot` resamples in parallel and collect the successful estimates.
pub fn bootstrap_samples(obs: &Observations, opts: &FitOptions, n_boot: usize, seed: u64) -> BootstrapSamples {
    let n = obs.len();
    let results: Vec<Option<(f64, f64)>> = (0..n_boot)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(resample_seed(seed, i));
            let idx: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let sample = obs.resample(&idx);
            fit_observations(&sample, opts).ok().map(|f| (f.beta, f.theta))
        })
        .collect();

    let (betas, thetas) = results.into_iter().flatten().unzip();
    let samples = BootstrapSamples {
        requested: n_boot,
        betas,
        thetas,
    };
    info!(
        requested = n_boot,
        successful = samples.successful(),
        "bootstrap finished"
    );
    samples
}

/// 95% percentile intervals `(β_CI, Θ_CI)`.
///
/// Errors with `InsufficientData` when fewer than `MIN_SUCCESSFUL` resamples
/// converge.
pub fn bootstrap_ci(
    obs: &Observations,
    opts: &FitOptions,
    n_boot: usize,
    seed: u64,
) -> Result<([f64; 2], [f64; 2]), FitError> {
    let samples = bootstrap_samples(obs, opts, n_boot, seed);
    if samples.successful() < MIN_SUCCESSFUL {
        return Err(FitError::InsufficientData {
            needed: MIN_SUCCESSFUL,
            got: samples.successful(),
        });
    }
    let summary = samples
        .summary()
        .ok_or_else(|| FitError::Numerical("bootstrap summary unavailable".to_string()))?;
    Ok((summary.beta_ci_95, summary.theta_ci_95))
}

/// Reported intervals: bootstrap percentiles when enough resamples converged,
/// otherwise the analytic `±1.96·se` intervals of the point fit.
pub fn resolve_intervals(
    fit: &LogisticFit,
    summary: Option<&BootstrapSummary>,
) -> (Option<[f64; 2]>, Option<[f64; 2]>, CiSource) {
    match summary {
        Some(s) if s.n_successful >= MIN_SUCCESSFUL => {
            (Some(s.beta_ci_95), Some(s.theta_ci_95), CiSource::Bootstrap)
        }
        Some(s) => {
            warn!(
                successful = s.n_successful,
                needed = MIN_SUCCESSFUL,
                "too few bootstrap fits converged; using analytic intervals"
            );
            (fit.beta_ci_95, fit.theta_ci_95, CiSource::Analytic)
        }
        None => (fit.beta_ci_95, fit.theta_ci_95, CiSource::Analytic),
    }
}
