//! Command-line parsing for the threshold fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::{AsymptoteMode, FitMethod, NullKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "tfit",
    version,
    about = "Logistic threshold fitting with null-model falsification"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit one (R, response) dataset, compare against null models, and bootstrap CIs.
    Fit(FitArgs),
    /// Fit every dataset in a manifest and summarise β across domains.
    Cohort(CohortArgs),
    /// Apply Bonferroni / Holm / Benjamini–Hochberg to cohort ΔAIC comparisons.
    Correct(CorrectArgs),
    /// Weighted meta-regression of β on domain covariates.
    Meta(MetaArgs),
    /// Write a synthetic logistic dataset.
    Synth(SynthArgs),
}

/// Options shared by `fit` and `cohort`.
#[derive(Debug, Args, Clone)]
pub struct FitSettings {
    /// Estimation method.
    #[arg(long, value_enum, default_value_t = FitMethod::Nonlinear)]
    pub method: FitMethod,

    /// Estimate the upper asymptote L (free) or hold it at 1 (unit).
    #[arg(long, value_enum, default_value_t = AsymptoteMode::Free)]
    pub asymptote: AsymptoteMode,

    /// Hold Θ at this value and fit β alone.
    #[arg(long)]
    pub fixed_theta: Option<f64>,

    /// Min-max rescale the response into [0, 1] before fitting.
    #[arg(long)]
    pub normalize: bool,

    /// Column holding the control parameter R.
    #[arg(long, default_value = "R")]
    pub r_column: String,

    /// Column holding the response.
    #[arg(long, default_value = "response")]
    pub response_column: String,

    /// Bootstrap resamples (0 disables the bootstrap).
    #[arg(
        long,
        visible_alias = "bootstrap-samples",
        env = "TFIT_BOOTSTRAP_SAMPLES",
        default_value_t = 1000
    )]
    pub n_bootstrap: usize,

    /// Random seed for bootstrap resampling.
    #[arg(long, env = "TFIT_SEED", default_value_t = 1337)]
    pub seed: u64,

    /// Null model families to compare against.
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = NullKind::ALL.to_vec()
    )]
    pub null_models: Vec<NullKind>,

    /// ΔAIC a null must be beaten by (strictly).
    #[arg(long, default_value_t = 10.0)]
    pub min_delta_aic: f64,

    /// Minimum logistic R² for the threshold hypothesis to pass.
    #[arg(long, default_value_t = 0.90)]
    pub min_r2: f64,

    /// Iteration cap for the nonlinear solver.
    #[arg(long, default_value_t = 10_000)]
    pub max_iter: usize,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Input CSV with R and response columns.
    #[arg(short, long, visible_alias = "csv")]
    pub input: PathBuf,

    /// Write the fit summary JSON here.
    #[arg(short, long, visible_alias = "out")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub settings: FitSettings,
}

#[derive(Debug, Args, Clone)]
pub struct CohortArgs {
    /// Manifest CSV with `dataset, domain, path` columns.
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// Write the cohort summary JSON here.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Also write one CSV row per dataset (input for `tfit correct`).
    #[arg(long)]
    pub records_csv: Option<PathBuf>,

    /// Reference β.
    #[arg(long, default_value_t = crate::meta::CANONICAL_BETA)]
    pub canonical_beta: f64,

    /// Lower edge of the canonical β band.
    #[arg(long, default_value_t = crate::meta::CANONICAL_BAND.0)]
    pub band_low: f64,

    /// Upper edge of the canonical β band.
    #[arg(long, default_value_t = crate::meta::CANONICAL_BAND.1)]
    pub band_high: f64,

    #[command(flatten)]
    pub settings: FitSettings,
}

#[derive(Debug, Args, Clone)]
pub struct CorrectArgs {
    /// Cohort records CSV (from `tfit cohort --records-csv`).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Write the correction report JSON here.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Also write per-comparison corrected p-values as CSV.
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Family-wise error rate / FDR level.
    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,
}

#[derive(Debug, Args, Clone)]
pub struct MetaArgs {
    /// β table with `domain`, `beta` and optional CI width columns.
    #[arg(long)]
    pub beta_csv: PathBuf,

    /// Covariate table with `domain`, optional `field_type`, and numeric columns.
    #[arg(long)]
    pub covariates_csv: PathBuf,

    /// Directory for the summary JSON and coefficient CSV.
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Continuous covariates to regress on.
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = ["C_eff", "D_eff", "SNR", "Memory", "Theta_dot"].map(String::from).to_vec()
    )]
    pub covariates: Vec<String>,

    /// Skip field-type dummies even when a `field_type` column exists.
    #[arg(long)]
    pub no_field_types: bool,

    /// Bootstrap resamples for the R² envelope.
    #[arg(
        long,
        visible_alias = "bootstrap-samples",
        env = "TFIT_BOOTSTRAP_SAMPLES",
        default_value_t = 1000
    )]
    pub n_bootstrap: usize,

    /// Trees in the random forest (0 disables it).
    #[arg(long, default_value_t = 200)]
    pub rf_trees: usize,

    /// Keep only the k most important covariates (random-forest ranking).
    #[arg(long)]
    pub top_features: Option<usize>,

    /// Random seed for bootstrap and forest.
    #[arg(long, env = "TFIT_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Significance level for coefficient tests.
    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,
}

#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Output CSV path.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Number of points.
    #[arg(short = 'n', long, default_value_t = 40)]
    pub n: usize,

    #[arg(long, default_value_t = 4.2)]
    pub beta: f64,

    #[arg(long, default_value_t = 0.5)]
    pub theta: f64,

    /// Upper asymptote L.
    #[arg(long, default_value_t = 1.0)]
    pub asymptote: f64,

    #[arg(long, default_value_t = 0.0)]
    pub r_min: f64,

    #[arg(long, default_value_t = 1.0)]
    pub r_max: f64,

    /// Standard deviation of additive Gaussian noise.
    #[arg(long, default_value_t = 0.02)]
    pub noise: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn null_models_parse_comma_separated() {
        let cli = Cli::parse_from(["tfit", "fit", "-i", "x.csv", "--null-models", "linear,power"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.settings.null_models, vec![NullKind::Linear, NullKind::Power]);
        assert_eq!(args.settings.method, FitMethod::Nonlinear);
    }

    #[test]
    fn fit_accepts_long_aliases() {
        let cli = Cli::parse_from([
            "tfit",
            "fit",
            "--csv",
            "x.csv",
            "--out",
            "y.json",
            "--bootstrap-samples",
            "5",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.input, PathBuf::from("x.csv"));
        assert_eq!(args.output, Some(PathBuf::from("y.json")));
        assert_eq!(args.settings.n_bootstrap, 5);
    }

    #[test]
    fn verbosity_counts() {
        let cli = Cli::parse_from(["tfit", "-vv", "synth", "-o", "s.csv"]);
        assert_eq!(cli.verbose, 2);
    }
}
