//! Special functions and distribution tails used for inference.
//!
//! Only what the p-value and confidence-interval code needs:
//!
//! - `ln_gamma` (Lanczos, g = 7)
//! - regularized incomplete beta `I_x(a, b)` (continued fraction)
//! - regularized incomplete gamma `P(a, x)` / `Q(a, x)` (series + continued fraction)
//! - χ², Student-t, F and normal tails/quantiles built on top of those
//!
//! Accuracy is ~1e-12 relative over the ranges used by regression tables,
//! which is far below the precision anyone reads p-values at.

use std::f64::consts::PI;

/// Two-tailed 95% critical value of the standard normal.
pub const Z_95: f64 = 1.959_963_984_540_054;

const MAX_ITER: usize = 500;
const EPS: f64 = 1e-15;
const TINY: f64 = 1e-300;

const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the gamma function for `x > 0`.
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection: Γ(x)Γ(1-x) = π / sin(πx)
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = LANCZOS[0];
    let t = x + 7.5;
    for (i, &c) in LANCZOS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Regularized incomplete beta function `I_x(a, b)`.
pub fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_bt = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let bt = ln_bt.exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        bt * beta_cf(a, b, x) / a
    } else {
        1.0 - bt * beta_cf(b, a, 1.0 - x) / b
    }
}

/// Continued fraction for the incomplete beta (modified Lentz).
fn beta_cf(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m_f = m as f64;
        let m2 = 2.0 * m_f;

        let aa = m_f * (b - m_f) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m_f) * (qab + m_f) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Regularized lower incomplete gamma `P(a, x)`.
pub fn gamma_p(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x < a + 1.0 {
        gamma_series(a, x)
    } else {
        1.0 - gamma_cf(a, x)
    }
}

/// Regularized upper incomplete gamma `Q(a, x) = 1 - P(a, x)`.
pub fn gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        1.0 - gamma_series(a, x)
    } else {
        gamma_cf(a, x)
    }
}

fn gamma_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut sum = 1.0 / a;
    let mut del = sum;
    for _ in 0..MAX_ITER {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * EPS {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

fn gamma_cf(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_ITER {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

/// Survival function `P(X > x)` of a χ² distribution with `df` degrees of freedom.
pub fn chi2_sf(x: f64, df: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    gamma_q(df / 2.0, x / 2.0)
}

/// Inverse survival function of χ²: the `x` with `chi2_sf(x, df) = p`.
pub fn chi2_isf(p: f64, df: f64) -> f64 {
    if p >= 1.0 {
        return 0.0;
    }
    if p <= 0.0 {
        return f64::INFINITY;
    }
    if (df - 2.0).abs() < 1e-12 {
        // χ²(2) is exponential with mean 2.
        return -2.0 * p.ln();
    }
    invert_decreasing(|x| chi2_sf(x, df), p, 0.0)
}

/// Upper tail `P(T > t)` of Student's t with `df` degrees of freedom.
pub fn student_t_sf(t: f64, df: f64) -> f64 {
    let x = df / (df + t * t);
    let tail = 0.5 * incomplete_beta(df / 2.0, 0.5, x);
    if t >= 0.0 { tail } else { 1.0 - tail }
}

/// Two-sided p-value `P(|T| > |t|)`.
pub fn student_t_two_sided_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return if t.is_nan() { f64::NAN } else { 0.0 };
    }
    (2.0 * student_t_sf(t.abs(), df)).min(1.0)
}

/// Quantile of Student's t: the `t` with `P(T <= t) = prob`.
pub fn student_t_quantile(prob: f64, df: f64) -> f64 {
    if prob <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if prob >= 1.0 {
        return f64::INFINITY;
    }
    if (prob - 0.5).abs() < 1e-15 {
        return 0.0;
    }
    if prob < 0.5 {
        return -student_t_quantile(1.0 - prob, df);
    }
    invert_decreasing(|t| student_t_sf(t, df), 1.0 - prob, 0.0)
}

/// Upper tail `P(F > f)` of the F distribution with `(d1, d2)` degrees of freedom.
pub fn f_sf(f: f64, d1: f64, d2: f64) -> f64 {
    if f <= 0.0 {
        return 1.0;
    }
    incomplete_beta(d2 / 2.0, d1 / 2.0, d2 / (d2 + d1 * f))
}

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    let z = x / std::f64::consts::SQRT_2;
    if z >= 0.0 {
        1.0 - 0.5 * gamma_q(0.5, z * z)
    } else {
        0.5 * gamma_q(0.5, z * z)
    }
}

/// Find `x >= lower` with `f(x) = target` for a decreasing `f`, by bracketing then bisection.
fn invert_decreasing(f: impl Fn(f64) -> f64, target: f64, lower: f64) -> f64 {
    let mut lo = lower;
    let mut hi = lower + 1.0;
    let mut guard = 0;
    while f(hi) > target && guard < 2000 {
        lo = hi;
        hi *= 2.0;
        guard += 1;
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if f(mid) > target {
            lo = mid;
        } else {
            hi = mid;
        }
        if (hi - lo) <= 1e-13 * hi.abs().max(1.0) {
            break;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * b.abs().max(1.0)
    }

    #[test]
    fn ln_gamma_matches_factorials() {
        assert!(close(ln_gamma(1.0), 0.0, 1e-12));
        assert!(close(ln_gamma(5.0), 24.0_f64.ln(), 1e-12));
        assert!(close(ln_gamma(0.5), PI.sqrt().ln(), 1e-12));
    }

    #[test]
    fn chi2_two_df_is_exponential() {
        for &x in &[0.5, 2.0, 10.0, 25.0] {
            assert!(close(chi2_sf(x, 2.0), (-x / 2.0_f64).exp(), 1e-10));
        }
        assert!(close(chi2_isf(0.05, 2.0), 5.991_464_547_107_979, 1e-10));
    }

    #[test]
    fn chi2_isf_inverts_general_df() {
        // χ²(1) 95th percentile.
        let x = chi2_isf(0.05, 1.0);
        assert!(close(x, 3.841_458_820_694_124, 1e-8), "got {x}");
    }

    #[test]
    fn student_t_reference_values() {
        // t_{0.975, 10} = 2.228138851986...
        let q = student_t_quantile(0.975, 10.0);
        assert!(close(q, 2.228_138_851_986_273, 1e-8), "got {q}");
        let p = student_t_two_sided_p(2.228_138_851_986_273, 10.0);
        assert!(close(p, 0.05, 1e-8), "got {p}");
        assert!(close(student_t_quantile(0.025, 10.0), -q, 1e-12));
    }

    #[test]
    fn f_tail_reference_value() {
        // F_{0.95}(2, 10) = 4.102821015130...
        let p = f_sf(4.102_821_015_130_399, 2.0, 10.0);
        assert!(close(p, 0.05, 1e-8), "got {p}");
    }

    #[test]
    fn normal_cdf_reference_values() {
        assert!(close(normal_cdf(0.0), 0.5, 1e-14));
        assert!(close(normal_cdf(Z_95), 0.975, 1e-10));
        assert!(close(normal_cdf(-Z_95), 0.025, 1e-10));
    }
}
