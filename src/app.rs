//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - sets up logging
//! - turns flags into run configs and hands them to `pipeline`
//! - prints the formatted reports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, CohortArgs, Command, CorrectArgs, FitArgs, FitSettings, MetaArgs, SynthArgs};
use crate::domain::{
    ColumnSpec, CohortConfig, CorrectionConfig, FalsificationGuard, FitConfig, MetaConfig, SynthConfig,
};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `tfit` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Cohort(args) => handle_cohort(args),
        Command::Correct(args) => handle_correct(args),
        Command::Meta(args) => handle_meta(args),
        Command::Synth(args) => handle_synth(args),
    }
}

/// Logs go to stderr so report output on stdout stays clean.
///
/// `RUST_LOG` wins over `-v` when set.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_fit(&config)?;
    println!("{}", crate::report::format_fit_summary(&run, &config));
    Ok(())
}

fn handle_cohort(args: CohortArgs) -> Result<(), AppError> {
    let config = cohort_config_from_args(&args)?;
    let run = pipeline::run_cohort(&config)?;
    println!("{}", crate::report::format_cohort_summary(&run));
    Ok(())
}

fn handle_correct(args: CorrectArgs) -> Result<(), AppError> {
    let config = CorrectionConfig {
        input: args.input.clone(),
        output: args.output.clone(),
        alpha: args.alpha,
    };
    let report = pipeline::run_correction(&config, args.csv.as_deref())?;
    println!("{}", crate::report::format_correction_report(&report));
    Ok(())
}

fn handle_meta(args: MetaArgs) -> Result<(), AppError> {
    let config = meta_config_from_args(&args)?;
    let file = pipeline::run_meta(&config)?;
    println!("{}", crate::report::format_meta_summary(&file));
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = synth_config_from_args(&args);
    let obs = pipeline::run_synth(&config)?;
    print!("{}", crate::report::format_synth_summary(&obs, &config));
    Ok(())
}

fn fit_config_from_settings(
    settings: &FitSettings,
    input: std::path::PathBuf,
    output: Option<std::path::PathBuf>,
) -> Result<FitConfig, AppError> {
    if settings.null_models.is_empty() {
        return Err(AppError::new(2, "--null-models must name at least one model."));
    }
    if settings.max_iter == 0 {
        return Err(AppError::new(2, "--max-iter must be > 0."));
    }
    if !(0.0..=1.0).contains(&settings.min_r2) {
        return Err(AppError::new(2, "--min-r2 must be in [0, 1]."));
    }
    if settings.fixed_theta.is_some_and(|t| !t.is_finite()) {
        return Err(AppError::new(2, "--fixed-theta must be finite."));
    }

    let mut null_models = settings.null_models.clone();
    null_models.sort();
    null_models.dedup();

    Ok(FitConfig {
        input,
        output,
        columns: ColumnSpec {
            r: settings.r_column.clone(),
            response: settings.response_column.clone(),
        },
        method: settings.method,
        asymptote: settings.asymptote,
        fixed_theta: settings.fixed_theta,
        normalize: settings.normalize,
        n_bootstrap: settings.n_bootstrap,
        seed: settings.seed,
        null_models,
        guard: FalsificationGuard {
            min_delta_aic: settings.min_delta_aic,
            min_r_squared: settings.min_r2,
        },
        max_iterations: settings.max_iter,
    })
}

pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    fit_config_from_settings(&args.settings, args.input.clone(), args.output.clone())
}

pub fn cohort_config_from_args(args: &CohortArgs) -> Result<CohortConfig, AppError> {
    let band = validate_band(args.band_low, args.band_high)?;
    Ok(CohortConfig {
        manifest: args.manifest.clone(),
        output: args.output.clone(),
        records_csv: args.records_csv.clone(),
        fit: fit_config_from_settings(&args.settings, args.manifest.clone(), None)?,
        canonical_beta: args.canonical_beta,
        canonical_band: band,
    })
}

pub fn meta_config_from_args(args: &MetaArgs) -> Result<MetaConfig, AppError> {
    if !(args.alpha > 0.0 && args.alpha < 1.0) {
        return Err(AppError::new(2, "--alpha must be in (0, 1)."));
    }
    if args.top_features == Some(0) {
        return Err(AppError::new(2, "--top-features must be > 0."));
    }
    Ok(MetaConfig {
        beta_csv: args.beta_csv.clone(),
        covariates_csv: args.covariates_csv.clone(),
        output_dir: args.output_dir.clone(),
        covariates: args.covariates.clone(),
        use_field_types: !args.no_field_types,
        n_bootstrap: args.n_bootstrap,
        rf_trees: args.rf_trees,
        top_features: args.top_features,
        seed: args.seed,
        alpha: args.alpha,
        canonical_beta: crate::meta::CANONICAL_BETA,
        canonical_band: crate::meta::CANONICAL_BAND,
    })
}

pub fn synth_config_from_args(args: &SynthArgs) -> SynthConfig {
    SynthConfig {
        output: args.output.clone(),
        n: args.n,
        beta: args.beta,
        theta: args.theta,
        asymptote: args.asymptote,
        r_min: args.r_min,
        r_max: args.r_max,
        noise: args.noise,
        seed: args.seed,
    }
}

fn validate_band(low: f64, high: f64) -> Result<(f64, f64), AppError> {
    if !(low.is_finite() && high.is_finite() && low <= high) {
        return Err(AppError::new(2, "Canonical band must satisfy low <= high."));
    }
    Ok((low, high))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NullKind;

    fn parse_fit(args: &[&str]) -> FitArgs {
        let mut argv = vec!["tfit", "fit"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Command::Fit(a) => a,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn fit_config_carries_guard_and_columns() {
        let args = parse_fit(&[
            "-i",
            "data.csv",
            "--r-column",
            "x",
            "--min-delta-aic",
            "4",
            "--null-models",
            "power,linear,power",
        ]);
        let config = fit_config_from_args(&args).unwrap();
        assert_eq!(config.columns.r, "x");
        assert_eq!(config.columns.response, "response");
        assert_eq!(config.guard.min_delta_aic, 4.0);
        assert_eq!(config.null_models, vec![NullKind::Linear, NullKind::Power]);
    }

    #[test]
    fn out_of_range_r2_floor_is_rejected() {
        let args = parse_fit(&["-i", "data.csv", "--min-r2", "1.5"]);
        assert_eq!(fit_config_from_args(&args).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn inverted_band_is_rejected() {
        assert!(validate_band(4.8, 3.6).is_err());
        assert_eq!(validate_band(3.6, 4.8).unwrap(), (3.6, 4.8));
    }
}
