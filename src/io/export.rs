//! CSV exports.
//!
//! Cohort tables and coefficient tables are meant to be easy to consume in
//! spreadsheets or downstream scripts, and the cohort table is read back by
//! `tfit correct`.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::domain::{CohortRecord, CoefficientRow, CorrectedComparison, Observations};
use crate::error::AppError;

/// Write serializable rows as a headed CSV file.
fn write_rows<T: Serialize>(path: &Path, rows: &[T], what: &str) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} CSV '{}': {e}", path.display())))?;
    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::new(2, format!("Failed to write {what} CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush {what} CSV: {e}")))?;
    Ok(())
}

/// One row per dataset of a cohort run.
pub fn write_cohort_csv(path: &Path, records: &[CohortRecord]) -> Result<(), AppError> {
    write_rows(path, records, "cohort")
}

/// Meta-regression coefficient table.
pub fn write_coefficients_csv(path: &Path, rows: &[CoefficientRow]) -> Result<(), AppError> {
    write_rows(path, rows, "coefficient")
}

/// Per-comparison corrected p-values.
pub fn write_corrections_csv(path: &Path, rows: &[CorrectedComparison]) -> Result<(), AppError> {
    write_rows(path, rows, "correction")
}

#[derive(Serialize)]
struct ObservationRow {
    #[serde(rename = "R")]
    r: f64,
    response: f64,
}

/// `(R, response)` pairs in the default ingest layout.
pub fn write_observations_csv(path: &Path, obs: &Observations) -> Result<(), AppError> {
    let rows: Vec<ObservationRow> = obs
        .r()
        .iter()
        .zip(obs.y())
        .map(|(&r, &response)| ObservationRow { r, response })
        .collect();
    write_rows(path, &rows, "observation")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnSpec, NullKind};
    use crate::io::{load_cohort_records, load_observations};

    #[test]
    fn cohort_csv_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cohort.csv");
        let rec = CohortRecord {
            dataset: "wais".into(),
            domain: "climate".into(),
            source: "wais.csv".into(),
            beta: 4.1,
            theta: 0.52,
            beta_ci_lower: Some(3.6),
            beta_ci_upper: Some(4.7),
            beta_ci_width: Some(1.1),
            r_squared: 0.97,
            aic: -120.5,
            delta_aic_linear: Some(40.0),
            delta_aic_power: None,
            delta_aic_exponential: Some(18.2),
            delta_aic: Some(18.2),
            best_null: Some(NullKind::Exponential),
            falsification_pass: true,
        };
        write_cohort_csv(&path, &[rec.clone()]).unwrap();

        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("dataset,domain,source,beta,theta,"));
        assert_eq!(load_cohort_records(&path).unwrap(), vec![rec]);
    }

    #[test]
    fn observations_csv_uses_ingest_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.csv");
        let obs = Observations::new(vec![0.1, 0.2, 0.3], vec![0.0, 0.5, 1.0]).unwrap();
        write_observations_csv(&path, &obs).unwrap();
        let back = load_observations(&path, &ColumnSpec::default()).unwrap();
        assert_eq!(back.observations, obs);
    }
}
