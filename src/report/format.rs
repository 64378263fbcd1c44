//! Terminal output for every subcommand.
//!
//! Formatting lives here so the fitting and aggregation code stays free of
//! presentation concerns. Every function returns a `String`; the caller prints.

use crate::app::pipeline::{CohortRun, FitRun};
use crate::domain::{
    CiSource, CorrectionReportFile, FitConfig, MetaRegressionFile, NullKind, Observations, SynthConfig,
};

/// Format a `tfit fit` run: data, parameters, intervals, and the null-model table.
pub fn format_fit_summary(run: &FitRun, config: &FitConfig) -> String {
    let mut out = String::new();
    let fit = &run.fit;
    let stats = &run.ingest.stats;

    out.push_str("=== tfit - Logistic Threshold Fit ===\n");
    out.push_str(&format!("Input: {}\n", config.input.display()));
    out.push_str(&format!(
        "Points: n={} (skipped {}) | R=[{:.4}, {:.4}] | y=[{:.4}, {:.4}]{}\n",
        stats.n_points,
        run.ingest.row_errors.len(),
        stats.r_min,
        stats.r_max,
        stats.y_min,
        stats.y_max,
        if config.normalize { " (normalised)" } else { "" },
    ));
    out.push_str(&format!(
        "Method: {} | iterations={}\n",
        fit.method.display_name(),
        fit.iterations
    ));

    out.push_str("\nParameters:\n");
    out.push_str(&format!("- beta  : {:.4}{}\n", fit.beta, fmt_se(fit.beta_se)));
    out.push_str(&format!("- theta : {:.4}{}\n", fit.theta, fmt_se(fit.theta_se)));
    out.push_str(&format!("- L     : {:.4}\n", fit.asymptote));
    out.push_str(&format!(
        "- fit   : R2={:.4} RMSE={:.4} AIC={:.3} BIC={:.3}\n",
        fit.quality.r_squared, fit.quality.rmse, fit.quality.aic, fit.quality.bic
    ));

    let source = match run.ci_source {
        CiSource::Bootstrap => "bootstrap",
        CiSource::Analytic => "analytic",
    };
    out.push_str(&format!("\n95% intervals ({source}):\n"));
    out.push_str(&format!("- beta  : {}\n", fmt_ci(run.beta_ci_95)));
    out.push_str(&format!("- theta : {}\n", fmt_ci(run.theta_ci_95)));
    if let Some(b) = &run.bootstrap {
        out.push_str(&format!(
            "- resamples: {}/{} converged ({:.1}%)\n",
            b.n_successful,
            b.n_requested,
            100.0 * b.convergence_rate
        ));
    }

    out.push_str("\nNull models:\n");
    out.push_str(
        format!(
            "{:<12} {:>10} {:>12} {:>12} {:>10} {:<6}",
            "model", "R2", "dAIC", "dBIC", "dR2", "beaten"
        )
        .trim_end(),
    );
    out.push('\n');
    for c in &run.nulls.comparisons {
        let r2 = run
            .nulls
            .nulls
            .get(c.null)
            .map(|n| format!("{:>10.4}", n.quality.r_squared))
            .unwrap_or_else(|| format!("{:>10}", "-"));
        out.push_str(&format!(
            "{:<12} {r2} {:>12.3} {:>12.3} {:>10.4} {:<6}\n",
            c.null.display_name(),
            c.delta_aic,
            c.delta_bic,
            c.delta_r_squared,
            if c.falsification_pass { "yes" } else { "no" },
        ));
    }
    for s in &run.nulls.skipped {
        out.push_str(&format!("  (skipped {}) {}\n", s.kind.display_name(), s.reason));
    }

    let verdict = &run.summary.falsification;
    out.push_str(&format!(
        "\nThreshold hypothesis: {} (dAIC > {:.1}, R2 >= {:.2})\n",
        if verdict.pass { "SUPPORTED" } else { "NOT SUPPORTED" },
        verdict.min_delta_aic,
        verdict.min_r_squared,
    ));
    if let Some(path) = &config.output {
        out.push_str(&format!("Summary written to {}\n", path.display()));
    }

    out
}

/// Format a cohort run: headline β statistics, per-domain table, failures.
pub fn format_cohort_summary(run: &CohortRun) -> String {
    let s = &run.summary;
    let mut out = String::new();

    out.push_str("=== tfit - Cohort Summary ===\n");
    out.push_str(&format!(
        "Datasets: {} fitted / {} listed\n",
        s.n_fitted, s.n_datasets
    ));
    out.push_str(&format!(
        "beta: mean={} median={} sd={}\n",
        fmt_opt(s.beta_mean),
        fmt_opt(s.beta_median),
        fmt_opt(s.beta_std)
    ));
    out.push_str(&format!(
        "In band [{:.2}, {:.2}] around {:.2}: {}\n",
        s.canonical_band[0],
        s.canonical_band[1],
        s.canonical_beta,
        fmt_pct(s.fraction_in_band)
    ));
    out.push_str(&format!("Passing falsification: {}\n", fmt_pct(s.fraction_passing)));

    out.push_str("\nBy domain:\n");
    out.push_str(
        format!(
            "{:<20} {:>6} {:>10} {:>10} {:>6}",
            "domain", "n", "beta_mean", "beta_sd", "pass"
        )
        .trim_end(),
    );
    out.push('\n');
    for (domain, g) in &s.by_domain {
        out.push_str(&format!(
            "{:<20} {:>6} {:>10.3} {:>10} {:>6}\n",
            truncate(domain, 20),
            g.count,
            g.beta_mean,
            fmt_opt(g.beta_std),
            g.pass_count
        ));
    }

    if !s.failed.is_empty() {
        out.push_str("\nFailed:\n");
        for f in &s.failed {
            out.push_str(&format!("- {}: {}\n", f.dataset, f.error));
        }
    }

    out
}

/// Format the multiple-testing report.
pub fn format_correction_report(report: &CorrectionReportFile) -> String {
    let mut out = String::new();

    out.push_str("=== tfit - Multiple-Testing Correction ===\n");
    out.push_str(&format!(
        "Tests: {} across {} datasets | alpha={}\n",
        report.n_tests, report.n_datasets, report.alpha
    ));
    out.push_str(&format!(
        "dAIC thresholds: uncorrected > {:.2} | Bonferroni (alpha={:.2e}) > {:.2}\n",
        report.thresholds.uncorrected_delta_aic,
        report.thresholds.bonferroni_alpha,
        report.thresholds.bonferroni_delta_aic
    ));

    out.push_str("\nSignificant tests:\n");
    let c = &report.counts;
    for (label, count) in [
        ("uncorrected", c.uncorrected),
        ("Bonferroni", c.bonferroni),
        ("Holm", c.holm),
        ("Benjamini-Hochberg", c.benjamini_hochberg),
    ] {
        out.push_str(&format!("- {label:<20} {count:>4} / {}\n", report.n_tests));
    }

    for kind in NullKind::ALL {
        let of_kind: Vec<_> = report.comparisons.iter().filter(|x| x.null == kind).collect();
        if of_kind.is_empty() {
            continue;
        }
        let holm = of_kind.iter().filter(|x| x.holm_significant).count();
        out.push_str(&format!(
            "  vs {:<12} {holm:>4} / {} survive Holm\n",
            kind.display_name(),
            of_kind.len()
        ));
    }

    out
}

/// Format a meta-regression run.
pub fn format_meta_summary(file: &MetaRegressionFile) -> String {
    let mut out = String::new();

    out.push_str("=== tfit - Meta-Regression ===\n");
    out.push_str(&format!(
        "Domains: {} | weighted={} | R2={:.4} adj R2={:.4} AIC={:.3}\n",
        file.n_domains, file.wls.weighted, file.wls.r_squared, file.wls.adj_r_squared, file.wls.aic
    ));
    if !file.dropped_covariates.is_empty() {
        out.push_str(&format!("Dropped covariates: {}\n", file.dropped_covariates.join(", ")));
    }
    if let Some(env) = &file.r_squared_bootstrap {
        out.push_str(&format!(
            "Bootstrap R2: median={:.3} [{:.3}, {:.3}] ({} resamples)\n",
            env.median, env.p05, env.p95, env.n_successful
        ));
    }

    out.push_str("\nCoefficients (Holm-corrected):\n");
    out.push_str(
        format!(
            "{:<16} {:>10} {:>10} {:>8} {:>10} {:>10} {:<3}",
            "variable", "coef", "se", "t", "p", "p_holm", "sig"
        )
        .trim_end(),
    );
    out.push('\n');
    for row in &file.coefficients {
        out.push_str(&format!(
            "{:<16} {:>10.4} {:>10.4} {:>8.3} {:>10.4} {:>10.4} {:<3}\n",
            truncate(&row.variable, 16),
            row.coefficient,
            row.std_error,
            row.t_statistic,
            row.p_value,
            row.p_value_corrected,
            if row.significant { "*" } else { "" },
        ));
    }

    if let Some(forest) = &file.forest {
        out.push_str(&format!(
            "\nRandom forest ({} trees, OOB R2={}):\n",
            forest.n_trees,
            fmt_opt(forest.oob_r_squared)
        ));
        for imp in &forest.importances {
            out.push_str(&format!("- {:<16} {:.4}\n", truncate(&imp.feature, 16), imp.importance));
        }
    }
    if let Some(anova) = &file.anova {
        out.push_str(&format!(
            "\nField-type ANOVA: groups={} F={:.3} p={:.4} eta2={:.3}\n",
            anova.n_groups, anova.f_statistic, anova.p_value, anova.eta_squared
        ));
    }
    out.push_str(&format!(
        "\nbeta in canonical band around {:.2}: {}\n",
        file.canonical_beta,
        fmt_pct(file.fraction_in_band)
    ));

    out
}

pub fn format_synth_summary(obs: &Observations, config: &SynthConfig) -> String {
    format!(
        "Wrote {} points to {} (beta={}, theta={}, L={}, noise={}, seed={})\n",
        obs.len(),
        config.output.display(),
        config.beta,
        config.theta,
        config.asymptote,
        config.noise,
        config.seed
    )
}

fn fmt_se(se: Option<f64>) -> String {
    se.map(|s| format!(" (se {s:.4})")).unwrap_or_default()
}

fn fmt_ci(ci: Option<[f64; 2]>) -> String {
    match ci {
        Some([lo, hi]) => format!("[{lo:.4}, {hi:.4}]"),
        None => "n/a".to_string(),
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.3}")).unwrap_or_else(|| "n/a".to_string())
}

fn fmt_pct(v: Option<f64>) -> String {
    v.map(|x| format!("{:.1}%", 100.0 * x))
        .unwrap_or_else(|| "n/a".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
