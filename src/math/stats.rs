//! Descriptive statistics and goodness-of-fit helpers.

use std::cmp::Ordering;

/// Floor applied to SSE before taking logs so perfect fits keep a finite AIC.
pub const SSE_FLOOR: f64 = 1e-12;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Standard deviation with `ddof` delta degrees of freedom (1 = sample std).
pub fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    let n = values.len();
    if n <= ddof {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (n - ddof) as f64).sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Percentile with linear interpolation between order statistics
/// (the convention used by numpy's default `percentile`).
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Sum of squared residuals.
pub fn sse(observed: &[f64], predicted: &[f64]) -> f64 {
    observed
        .iter()
        .zip(predicted)
        .map(|(y, f)| (y - f) * (y - f))
        .sum()
}

/// Coefficient of determination. By convention `1.0` when the observations
/// have no variance (`SS_total == 0`).
pub fn r_squared(observed: &[f64], predicted: &[f64]) -> f64 {
    let Some(m) = mean(observed) else {
        return f64::NAN;
    };
    let ss_tot: f64 = observed.iter().map(|y| (y - m) * (y - m)).sum();
    if ss_tot == 0.0 {
        return 1.0;
    }
    1.0 - sse(observed, predicted) / ss_tot
}

/// Gaussian AIC in least-squares form: `n ln(SSE/n) + 2k`.
pub fn aic(n: usize, sse: f64, k: usize) -> f64 {
    let n_f = n as f64;
    n_f * (sse.max(SSE_FLOOR) / n_f).ln() + 2.0 * k as f64
}

/// Gaussian BIC in least-squares form: `n ln(SSE/n) + k ln n`.
pub fn bic(n: usize, sse: f64, k: usize) -> f64 {
    let n_f = n as f64;
    n_f * (sse.max(SSE_FLOOR) / n_f).ln() + k as f64 * n_f.ln()
}

pub fn rmse(n: usize, sse: f64) -> f64 {
    (sse / n as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_like_numpy() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 0.0), Some(1.0));
        assert_eq!(percentile(&v, 100.0), Some(4.0));
        // numpy.percentile([1,2,3,4], 25) == 1.75
        assert!((percentile(&v, 25.0).unwrap() - 1.75).abs() < 1e-12);
        assert!((median(&v).unwrap() - 2.5).abs() < 1e-12);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn r_squared_constant_observations_is_one() {
        assert_eq!(r_squared(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]), 1.0);
    }

    #[test]
    fn aic_penalises_parameters() {
        let a2 = aic(20, 1.0, 2);
        let a3 = aic(20, 1.0, 3);
        assert!((a3 - a2 - 2.0).abs() < 1e-12);
        assert!(aic(20, 0.0, 2).is_finite());
        assert!(bic(20, 1.0, 3) > a3);
    }

    #[test]
    fn sample_std_uses_ddof() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&v, 0).unwrap() - 2.0).abs() < 1e-12);
        assert!(std_dev(&[1.0], 1).is_none());
    }
}
