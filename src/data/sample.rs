//! Synthetic logistic threshold datasets.
//!
//! Points are evenly spaced in `[r_min, r_max]` with Gaussian noise added to
//! `L σ(β(R - Θ))`. The generator is fully determined by its seed.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::domain::{LogisticForm, Observations, SynthConfig};
use crate::error::AppError;
use crate::models::predict;

/// Generate a noisy logistic dataset.
pub fn generate_sample(config: &SynthConfig) -> Result<Observations, AppError> {
    if config.n < 3 {
        return Err(AppError::new(2, "Sample count must be >= 3."));
    }
    if !(config.r_min.is_finite() && config.r_max.is_finite() && config.r_max > config.r_min) {
        return Err(AppError::new(2, "Invalid R range for sample generation."));
    }
    if !(config.noise.is_finite() && config.noise >= 0.0) {
        return Err(AppError::new(2, "Noise level must be finite and >= 0."));
    }
    let params = [config.beta, config.theta, config.asymptote];
    if params.iter().any(|v| !v.is_finite()) {
        return Err(AppError::new(2, "Curve parameters must be finite."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, config.noise.max(f64::MIN_POSITIVE))
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let step = (config.r_max - config.r_min) / (config.n - 1) as f64;
    let r: Vec<f64> = (0..config.n).map(|i| config.r_min + step * i as f64).collect();
    let y: Vec<f64> = r
        .iter()
        .map(|&ri| {
            let clean = predict(LogisticForm::FreeAsymptote, ri, &params);
            if config.noise > 0.0 { clean + normal.sample(&mut rng) } else { clean }
        })
        .collect();

    Observations::new(r, y).map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(seed: u64, noise: f64) -> SynthConfig {
        SynthConfig {
            output: PathBuf::from("unused.csv"),
            n: 40,
            beta: 4.2,
            theta: 0.5,
            asymptote: 1.0,
            r_min: 0.0,
            r_max: 1.0,
            noise,
            seed,
        }
    }

    #[test]
    fn same_seed_same_sample() {
        let a = generate_sample(&config(42, 0.02)).unwrap();
        let b = generate_sample(&config(42, 0.02)).unwrap();
        let c = generate_sample(&config(43, 0.02)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.y(), c.y());
    }

    #[test]
    fn noiseless_sample_is_on_the_curve() {
        let s = generate_sample(&config(1, 0.0)).unwrap();
        assert_eq!(s.len(), 40);
        let expected = 1.0 / (1.0 + (4.2_f64 * 0.5).exp());
        assert!((s.y()[0] - expected).abs() < 1e-12);
        assert!((s.r()[39] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_settings() {
        let mut c = config(1, 0.02);
        c.n = 2;
        assert_eq!(generate_sample(&c).unwrap_err().exit_code(), 2);
        let mut c = config(1, -1.0);
        c.noise = -1.0;
        assert!(generate_sample(&c).is_err());
    }
}
