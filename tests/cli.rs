use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn tfit() -> Command {
    let mut cmd = Command::cargo_bin("tfit").unwrap();
    cmd.env_remove("TFIT_SEED")
        .env_remove("TFIT_BOOTSTRAP_SAMPLES")
        .env_remove("RUST_LOG");
    cmd
}

fn synth(path: &Path, beta: &str, seed: &str) {
    tfit()
        .args(["synth", "-o"])
        .arg(path)
        .args(["-n", "60", "--beta", beta, "--theta", "0.5", "--r-min", "0.05"])
        .args(["--noise", "0.02", "--seed", seed])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 60 points"));
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn synth_then_fit_writes_summary() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("steep.csv");
    let summary = dir.path().join("out/fit.json");
    synth(&data, "12", "7");

    tfit()
        .args(["fit", "-i"])
        .arg(&data)
        .arg("-o")
        .arg(&summary)
        .args(["--n-bootstrap", "100", "--seed", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logistic Threshold Fit"))
        .stdout(predicate::str::contains("SUPPORTED"));

    let json = read_json(&summary);
    let beta = json["logistic_parameters"]["beta"].as_f64().unwrap();
    let theta = json["logistic_parameters"]["theta"].as_f64().unwrap();
    assert!(beta > 8.0 && beta < 16.0, "beta = {beta}");
    assert!((theta - 0.5).abs() < 0.05, "theta = {theta}");
    assert_eq!(json["n_points"], 60);
    assert_eq!(json["ci_source"], "bootstrap");
    assert!(json["null_models"]["linear"].is_object());
    assert!(json["null_models"]["power"].is_object());
    assert!(json["bootstrap"]["n_successful"].as_u64().unwrap() >= 10);
    let ci = json["beta_ci_95"].as_array().unwrap();
    assert!(ci[0].as_f64().unwrap() <= beta && beta <= ci[1].as_f64().unwrap());
}

#[test]
fn bootstrap_is_reproducible_for_a_seed() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("d.csv");
    synth(&data, "10", "11");

    let run = |out: &Path| {
        tfit()
            .args(["fit", "-i"])
            .arg(&data)
            .arg("-o")
            .arg(out)
            .args(["--n-bootstrap", "60", "--seed", "99"])
            .assert()
            .success();
        read_json(out)["beta_ci_95"].clone()
    };
    let a = run(&dir.path().join("a.json"));
    let b = run(&dir.path().join("b.json"));
    assert_eq!(a, b);
}

#[test]
fn missing_column_exits_with_input_error() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("bad.csv");
    fs::write(&data, "x,response\n0,0.1\n1,0.5\n2,0.9\n").unwrap();

    tfit()
        .args(["fit", "-i"])
        .arg(&data)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Missing required column `R`"));
}

#[test]
fn too_few_rows_exits_with_insufficient_data() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("short.csv");
    fs::write(&data, "R,response\n0,0.1\n1,0.9\n").unwrap();

    tfit()
        .args(["fit", "-i"])
        .arg(&data)
        .args(["--n-bootstrap", "0"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("insufficient data"));
}

#[test]
fn cohort_records_feed_the_correction_step() {
    let dir = TempDir::new().unwrap();
    synth(&dir.path().join("a.csv"), "12", "1");
    synth(&dir.path().join("b.csv"), "9", "2");
    synth(&dir.path().join("c.csv"), "15", "3");
    fs::write(dir.path().join("broken.csv"), "R,response\n0,0.1\n").unwrap();
    let manifest = dir.path().join("manifest.csv");
    fs::write(
        &manifest,
        "dataset,domain,path\n\
         a,physics,a.csv\n\
         b,physics,b.csv\n\
         c,biology,c.csv\n\
         broken,biology,broken.csv\n",
    )
    .unwrap();

    let summary = dir.path().join("cohort.json");
    let records = dir.path().join("records.csv");
    tfit()
        .args(["cohort", "-m"])
        .arg(&manifest)
        .arg("-o")
        .arg(&summary)
        .arg("--records-csv")
        .arg(&records)
        .args(["--n-bootstrap", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 fitted / 4 listed"));

    let json = read_json(&summary);
    assert_eq!(json["n_fitted"], 3);
    assert_eq!(json["failed"][0]["dataset"], "broken");
    assert_eq!(json["by_domain"]["physics"]["count"], 2);

    let report = dir.path().join("corrections.json");
    let table = dir.path().join("corrections.csv");
    tfit()
        .args(["correct", "-i"])
        .arg(&records)
        .arg("-o")
        .arg(&report)
        .arg("--csv")
        .arg(&table)
        .assert()
        .success()
        .stdout(predicate::str::contains("Multiple-Testing Correction"));

    let json = read_json(&report);
    assert_eq!(json["n_datasets"], 3);
    assert_eq!(json["n_tests"], 9);
    let counts = &json["counts"];
    let holm = counts["holm"].as_u64().unwrap();
    assert!(holm >= counts["bonferroni"].as_u64().unwrap());
    assert!(counts["benjamini_hochberg"].as_u64().unwrap() >= holm);
    assert!(fs::read_to_string(&table).unwrap().starts_with("dataset,null,delta_aic"));
}

#[test]
fn meta_regression_writes_json_and_coefficients() {
    let dir = TempDir::new().unwrap();
    let betas = dir.path().join("betas.csv");
    let covariates = dir.path().join("covariates.csv");

    let mut beta_csv = String::from("domain,beta,beta_ci_width\n");
    let mut cov_csv = String::from("domain,field_type,SNR,Memory\n");
    for i in 0..12 {
        let snr = i as f64;
        let memory = ((i * 7) % 5) as f64;
        let beta = 3.0 + 0.2 * snr + 0.05 * memory + if i % 2 == 0 { 0.03 } else { -0.03 };
        beta_csv.push_str(&format!("d{i},{beta},{}\n", 0.4 + 0.05 * i as f64));
        let field = if i % 3 == 0 { "neural" } else { "social" };
        cov_csv.push_str(&format!("d{i},{field},{snr},{memory}\n"));
    }
    fs::write(&betas, beta_csv).unwrap();
    fs::write(&covariates, cov_csv).unwrap();

    let out = dir.path().join("meta");
    tfit()
        .args(["meta", "--beta-csv"])
        .arg(&betas)
        .arg("--covariates-csv")
        .arg(&covariates)
        .arg("--output-dir")
        .arg(&out)
        .args(["--covariates", "SNR,Memory", "--n-bootstrap", "50", "--rf-trees", "20"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Meta-Regression"));

    let json = read_json(&out.join("meta_regression.json"));
    assert_eq!(json["n_domains"], 12);
    assert!(json["wls"]["weighted"].as_bool().unwrap());
    assert!(json["wls"]["r_squared"].as_f64().unwrap() > 0.9);
    let snr = json["coefficients"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["variable"] == "SNR")
        .unwrap();
    assert!((snr["coefficient"].as_f64().unwrap() - 0.2).abs() < 0.05);
    assert!(json["anova"].is_object());
    assert!(out.join("meta_coefficients.csv").exists());
}
