//! Shared run logic for every subcommand.
//!
//! Each `run_*` function takes a resolved config, does all the work (ingest,
//! fitting, aggregation, writing artifacts), and returns the computed outputs so
//! the caller only has to decide what to print.

use std::path::Path;

use chrono::Utc;
use tracing::{info, info_span, warn};

use crate::correction::{correct_tests, tests_from_records};
use crate::domain::{
    BootstrapSummary, CiSource, CohortConfig, CohortRecord, CohortSummaryFile, CorrectionConfig,
    CorrectionReportFile, FailedDataset, FalsificationSummary, FitConfig, FitSummaryFile, LogisticFit,
    MetaConfig, MetaRegressionFile, Observations, SynthConfig,
};
use crate::error::AppError;
use crate::fit::{
    bootstrap_samples, compare_against_nulls, fit_observations, resolve_intervals, FitOptions,
    NullComparison,
};
use crate::io::{
    load_beta_table, load_cohort_records, load_covariate_table, load_manifest, load_observations,
    write_coefficients_csv, write_cohort_csv, write_corrections_csv, write_json, write_observations_csv,
    IngestedData,
};
use crate::meta::{band_fraction, build_meta_dataset, cohort_record, run_meta_regression, summarize_cohort, MetaOptions};

/// Tool identifier stamped into every JSON artifact.
pub const TOOL: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// All computed outputs of a single `tfit fit` run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub ingest: IngestedData,
    /// Observations the curve was fitted to (normalised when requested).
    pub observations: Observations,
    pub fit: LogisticFit,
    pub nulls: NullComparison,
    pub bootstrap: Option<BootstrapSummary>,
    pub beta_ci_95: Option<[f64; 2]>,
    pub theta_ci_95: Option<[f64; 2]>,
    pub ci_source: CiSource,
    pub summary: FitSummaryFile,
}

pub fn fit_options(config: &FitConfig) -> FitOptions {
    FitOptions {
        method: config.method,
        asymptote: config.asymptote,
        fixed_theta: config.fixed_theta,
        max_iterations: config.max_iterations,
    }
}

/// Execute the single-dataset pipeline: ingest -> fit -> nulls -> bootstrap -> summary.
pub fn run_fit(config: &FitConfig) -> Result<FitRun, AppError> {
    let ingest = load_observations(&config.input, &config.columns)?;
    let run = fit_ingested(config, ingest)?;
    if let Some(path) = &config.output {
        write_json(path, &run.summary)?;
        info!(path = %path.display(), "fit summary written");
    }
    Ok(run)
}

/// Fit already-loaded data. Used by `run_fit` and once per cohort dataset.
pub fn fit_ingested(config: &FitConfig, ingest: IngestedData) -> Result<FitRun, AppError> {
    let source = config.input.display().to_string();
    let _span = info_span!("fit", source = %source).entered();

    let observations = if config.normalize {
        ingest.observations.normalized()?
    } else {
        ingest.observations.clone()
    };

    let opts = fit_options(config);
    let fit = fit_observations(&observations, &opts)?;
    info!(
        beta = fit.beta,
        theta = fit.theta,
        r_squared = fit.quality.r_squared,
        iterations = fit.iterations,
        "logistic fitted"
    );

    let nulls = compare_against_nulls(&fit, &observations, &config.null_models, config.guard);

    let bootstrap = if config.n_bootstrap > 0 {
        let samples = bootstrap_samples(&observations, &opts, config.n_bootstrap, config.seed);
        let summary = samples.summary();
        if summary.is_none() {
            warn!("no bootstrap resample converged; using analytic intervals");
        }
        summary
    } else {
        None
    };
    let (beta_ci_95, theta_ci_95, ci_source) = resolve_intervals(&fit, bootstrap.as_ref());

    let summary = FitSummaryFile {
        tool: TOOL.to_string(),
        generated_at: Utc::now(),
        source,
        n_points: observations.len(),
        rows_skipped: ingest.rows_read - ingest.rows_used,
        normalized: config.normalize,
        logistic_parameters: fit.clone(),
        null_models: nulls.nulls.clone(),
        skipped_null_models: nulls.skipped.clone(),
        beta_ci_95,
        theta_ci_95,
        ci_source,
        bootstrap: bootstrap.clone(),
        falsification: FalsificationSummary::from_comparisons(config.guard, nulls.comparisons.clone()),
    };

    Ok(FitRun {
        ingest,
        observations,
        fit,
        nulls,
        bootstrap,
        beta_ci_95,
        theta_ci_95,
        ci_source,
        summary,
    })
}

/// Outputs of a `tfit cohort` run.
#[derive(Debug, Clone)]
pub struct CohortRun {
    pub summary: CohortSummaryFile,
}

/// Fit every manifest dataset; failures are recorded and skipped.
pub fn run_cohort(config: &CohortConfig) -> Result<CohortRun, AppError> {
    let entries = load_manifest(&config.manifest, &config.fit.columns)?;
    if entries.is_empty() {
        return Err(AppError::new(3, "Manifest lists no datasets."));
    }

    let mut records: Vec<CohortRecord> = Vec::with_capacity(entries.len());
    let mut failed: Vec<FailedDataset> = Vec::new();

    for entry in &entries {
        let source = entry.path.display().to_string();
        let dataset_config = FitConfig {
            input: entry.path.clone(),
            output: None,
            columns: entry.columns.clone(),
            ..config.fit.clone()
        };

        let outcome = load_observations(&entry.path, &entry.columns)
            .and_then(|ingest| fit_ingested(&dataset_config, ingest));
        match outcome {
            Ok(run) => records.push(cohort_record(
                &entry.dataset,
                &entry.domain,
                &source,
                &run.fit,
                run.beta_ci_95,
                &run.nulls,
            )),
            Err(err) => {
                warn!(dataset = %entry.dataset, error = %err, "dataset failed; continuing");
                failed.push(FailedDataset {
                    dataset: entry.dataset.clone(),
                    source,
                    error: err.message().to_string(),
                });
            }
        }
    }

    if records.is_empty() {
        return Err(AppError::new(3, "No dataset in the manifest could be fitted."));
    }

    let stats = summarize_cohort(&records, config.canonical_band);
    let summary = CohortSummaryFile {
        tool: TOOL.to_string(),
        generated_at: Utc::now(),
        manifest: config.manifest.display().to_string(),
        n_datasets: entries.len(),
        n_fitted: records.len(),
        canonical_beta: config.canonical_beta,
        canonical_band: [config.canonical_band.0, config.canonical_band.1],
        beta_mean: stats.beta_mean,
        beta_median: stats.beta_median,
        beta_std: stats.beta_std,
        fraction_in_band: stats.fraction_in_band,
        fraction_passing: stats.fraction_passing,
        by_domain: stats.by_domain,
        failed,
        records,
    };

    write_json(&config.output, &summary)?;
    if let Some(path) = &config.records_csv {
        write_cohort_csv(path, &summary.records)?;
    }
    info!(fitted = summary.n_fitted, failed = summary.failed.len(), "cohort finished");

    Ok(CohortRun { summary })
}

/// Correct every cohort ΔAIC comparison for multiple testing.
pub fn run_correction(config: &CorrectionConfig, csv: Option<&Path>) -> Result<CorrectionReportFile, AppError> {
    if !(config.alpha > 0.0 && config.alpha < 1.0) {
        return Err(AppError::new(2, "--alpha must be in (0, 1)."));
    }
    let records = load_cohort_records(&config.input)?;
    let tests = tests_from_records(&records);
    if tests.is_empty() {
        return Err(AppError::new(3, "No ΔAIC comparisons found in the cohort records."));
    }

    let (comparisons, counts, thresholds) = correct_tests(&tests, config.alpha);
    let report = CorrectionReportFile {
        tool: TOOL.to_string(),
        generated_at: Utc::now(),
        source: config.input.display().to_string(),
        alpha: config.alpha,
        n_tests: tests.len(),
        n_datasets: records.len(),
        counts,
        thresholds,
        comparisons,
    };

    write_json(&config.output, &report)?;
    if let Some(path) = csv {
        write_corrections_csv(path, &report.comparisons)?;
    }
    Ok(report)
}

/// File names written into the meta-regression output directory.
pub const META_SUMMARY_FILE: &str = "meta_regression.json";
pub const META_COEFFICIENTS_FILE: &str = "meta_coefficients.csv";

/// Join β with covariates and run the meta-regression.
pub fn run_meta(config: &MetaConfig) -> Result<MetaRegressionFile, AppError> {
    let betas = load_beta_table(&config.beta_csv)?;
    let covariates = load_covariate_table(&config.covariates_csv)?;
    let dataset = build_meta_dataset(&betas, &covariates, &config.covariates, config.use_field_types)?;

    let opts = MetaOptions {
        n_bootstrap: config.n_bootstrap,
        rf_trees: config.rf_trees,
        top_features: config.top_features,
        seed: config.seed,
        alpha: config.alpha,
    };
    let outcome = run_meta_regression(&dataset, &opts)?;

    let file = MetaRegressionFile {
        tool: TOOL.to_string(),
        generated_at: Utc::now(),
        beta_source: config.beta_csv.display().to_string(),
        covariate_source: config.covariates_csv.display().to_string(),
        n_domains: dataset.domains.len(),
        covariates: outcome.design_names.clone(),
        dropped_covariates: dataset.dropped.clone(),
        wls: outcome.wls.summary.clone(),
        coefficients: outcome.wls.coefficients.clone(),
        r_squared_bootstrap: outcome.r_squared_bootstrap,
        forest: outcome.forest,
        selected_features: outcome.selected_features,
        anova: outcome.anova,
        canonical_beta: config.canonical_beta,
        fraction_in_band: band_fraction(&dataset.beta, config.canonical_band),
    };

    write_json(&config.output_dir.join(META_SUMMARY_FILE), &file)?;
    write_coefficients_csv(&config.output_dir.join(META_COEFFICIENTS_FILE), &file.coefficients)?;
    Ok(file)
}

/// Generate and write a synthetic dataset.
pub fn run_synth(config: &SynthConfig) -> Result<Observations, AppError> {
    let obs = crate::data::generate_sample(config)?;
    write_observations_csv(&config.output, &obs)?;
    Ok(obs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AsymptoteMode, ColumnSpec, FalsificationGuard, FitMethod, NullKind};
    use crate::io::read_fit_summary;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn synth_config(output: PathBuf, seed: u64) -> SynthConfig {
        SynthConfig {
            output,
            n: 50,
            beta: 12.0,
            theta: 0.5,
            asymptote: 1.0,
            r_min: 0.05,
            r_max: 1.0,
            noise: 0.02,
            seed,
        }
    }

    fn fit_config(input: PathBuf, output: Option<PathBuf>) -> FitConfig {
        FitConfig {
            input,
            output,
            columns: ColumnSpec::default(),
            method: FitMethod::Nonlinear,
            asymptote: AsymptoteMode::Free,
            fixed_theta: None,
            normalize: false,
            n_bootstrap: 40,
            seed: 5,
            null_models: NullKind::ALL.to_vec(),
            guard: FalsificationGuard::default(),
            max_iterations: 10_000,
        }
    }

    #[test]
    fn fit_summary_round_trips_through_json() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data.csv");
        let out = dir.path().join("fit.json");
        run_synth(&synth_config(data.clone(), 3)).unwrap();

        let run = run_fit(&fit_config(data, Some(out.clone()))).unwrap();
        assert_eq!(run.summary.n_points, 50);
        assert_eq!(run.nulls.comparisons.len(), 3);

        let reloaded = read_fit_summary(&out).unwrap();
        assert_eq!(reloaded, run.summary);
    }

    #[test]
    fn skipped_rows_count_every_unusable_line() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data.csv");
        run_synth(&synth_config(data.clone(), 6)).unwrap();
        let mut body = std::fs::read_to_string(&data).unwrap();
        body.push_str("0.5,NaN\nabc,0.3\n");
        std::fs::write(&data, body).unwrap();

        let mut config = fit_config(data, None);
        config.n_bootstrap = 0;
        let run = run_fit(&config).unwrap();
        assert_eq!(run.summary.n_points, 50);
        assert_eq!(run.summary.rows_skipped, 2);
    }

    #[test]
    fn disabled_bootstrap_reports_analytic_intervals() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data.csv");
        run_synth(&synth_config(data.clone(), 4)).unwrap();

        let mut config = fit_config(data, None);
        config.n_bootstrap = 0;
        let run = run_fit(&config).unwrap();
        assert!(run.bootstrap.is_none());
        assert_eq!(run.ci_source, CiSource::Analytic);
        assert_eq!(run.beta_ci_95, run.fit.beta_ci_95);
    }

    #[test]
    fn cohort_skips_failed_datasets() {
        let dir = TempDir::new().unwrap();
        run_synth(&synth_config(dir.path().join("good.csv"), 1)).unwrap();
        std::fs::write(dir.path().join("flat.csv"), "R,response\n0,0.5\n1,0.5\n2,0.5\n3,0.5\n").unwrap();
        let manifest = dir.path().join("manifest.csv");
        std::fs::write(&manifest, "dataset,domain,path\ngood,a,good.csv\nflat,b,flat.csv\n").unwrap();

        let config = CohortConfig {
            manifest: manifest.clone(),
            output: dir.path().join("cohort.json"),
            records_csv: Some(dir.path().join("records.csv")),
            fit: fit_config(manifest, None),
            canonical_beta: 4.2,
            canonical_band: (3.6, 4.8),
        };
        let run = run_cohort(&config).unwrap();
        assert_eq!(run.summary.n_fitted, 1);
        assert_eq!(run.summary.failed.len(), 1);
        assert_eq!(run.summary.failed[0].dataset, "flat");

        let records = load_cohort_records(&dir.path().join("records.csv")).unwrap();
        assert_eq!(records, run.summary.records);
    }

    #[test]
    fn correction_rejects_bad_alpha() {
        let config = CorrectionConfig {
            input: PathBuf::from("missing.csv"),
            output: PathBuf::from("out.json"),
            alpha: 1.5,
        };
        assert_eq!(run_correction(&config, None).unwrap_err().exit_code(), 2);
    }
}
