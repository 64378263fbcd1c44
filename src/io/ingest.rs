//! CSV ingest and validation.
//!
//! This module turns user CSVs into clean in-memory inputs:
//!
//! - `(R, response)` observation files for single-dataset fits
//! - cohort manifests (`dataset, domain, path`)
//! - cohort record tables (for multiple-testing correction)
//! - β and covariate tables (for meta-regression)
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Case-insensitive headers**, tolerant of a UTF-8 BOM
//! - **Separation of concerns**: no fitting logic here

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::{debug, warn};

use crate::domain::{CohortRecord, ColumnSpec, Observations};
use crate::error::AppError;
use crate::meta::{BetaRow, CovariateRow, CovariateTable};

/// Summary stats about the points actually used for fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStats {
    pub n_points: usize,
    pub r_min: f64,
    pub r_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: validated observations + stats + row errors.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub observations: Observations,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

/// One dataset listed in a cohort manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub dataset: String,
    pub domain: String,
    /// Resolved against the manifest's directory when relative.
    pub path: PathBuf,
    pub columns: ColumnSpec,
}

/// Load `(R, response)` observations from a CSV file.
pub fn load_observations(path: &Path, columns: &ColumnSpec) -> Result<IngestedData, AppError> {
    let (headers, mut reader) = open_csv(path)?;
    let header_map = build_header_map(&headers);
    let r_idx = require_column(&header_map, &columns.r, path)?;
    let y_idx = require_column(&header_map, &columns.response, path)?;

    let mut r = Vec::new();
    let mut y = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: header line plus 1-based numbering.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(rec) => rec,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match (parse_cell(&record, r_idx), parse_cell(&record, y_idx)) {
            (Ok(rv), Ok(yv)) => {
                r.push(rv);
                y.push(yv);
            }
            (Err(e), _) => row_errors.push(RowError {
                line,
                message: format!("`{}`: {e}", columns.r),
            }),
            (_, Err(e)) => row_errors.push(RowError {
                line,
                message: format!("`{}`: {e}", columns.response),
            }),
        }
    }

    for err in row_errors.iter().take(5) {
        debug!(line = err.line, message = %err.message, "row skipped");
    }
    if !row_errors.is_empty() {
        warn!(
            skipped = row_errors.len(),
            file = %path.display(),
            "rows skipped during ingest"
        );
    }

    let observations = Observations::new(r, y).map_err(|e| AppError::from(e).context(path.display()))?;
    let (r_min, r_max) = observations.r_range();
    let (y_min, y_max) = observations.y_range();
    let rows_used = observations.len();

    Ok(IngestedData {
        stats: DatasetStats {
            n_points: rows_used,
            r_min,
            r_max,
            y_min,
            y_max,
        },
        observations,
        row_errors,
        rows_read,
        rows_used,
    })
}

/// Load a cohort manifest with columns `dataset, domain, path`.
///
/// Optional `r_column` / `response_column` override `default_columns` per row.
pub fn load_manifest(path: &Path, default_columns: &ColumnSpec) -> Result<Vec<ManifestEntry>, AppError> {
    let (headers, mut reader) = open_csv(path)?;
    let header_map = build_header_map(&headers);
    let dataset_idx = require_column(&header_map, "dataset", path)?;
    let domain_idx = require_column(&header_map, "domain", path)?;
    let path_idx = require_column(&header_map, "path", path)?;
    let r_col_idx = header_map.get("r_column").copied();
    let y_col_idx = header_map.get("response_column").copied();

    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut entries = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::new(2, format!("Manifest line {line}: {e}")))?;
        let field = |i: usize, name: &str| -> Result<String, AppError> {
            get_field(&record, i)
                .map(str::to_string)
                .ok_or_else(|| AppError::new(2, format!("Manifest line {line}: missing `{name}`")))
        };

        let dataset = field(dataset_idx, "dataset")?;
        let domain = field(domain_idx, "domain")?;
        let raw_path = PathBuf::from(field(path_idx, "path")?);
        let resolved = if raw_path.is_absolute() { raw_path } else { base.join(raw_path) };

        let columns = ColumnSpec {
            r: r_col_idx
                .and_then(|i| get_field(&record, i))
                .map_or_else(|| default_columns.r.clone(), str::to_string),
            response: y_col_idx
                .and_then(|i| get_field(&record, i))
                .map_or_else(|| default_columns.response.clone(), str::to_string),
        };

        entries.push(ManifestEntry {
            dataset,
            domain,
            path: resolved,
            columns,
        });
    }

    if entries.is_empty() {
        return Err(AppError::new(3, format!("Manifest '{}' lists no datasets.", path.display())));
    }
    Ok(entries)
}

/// Load cohort records written by `write_cohort_csv`.
pub fn load_cohort_records(path: &Path) -> Result<Vec<CohortRecord>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open cohort CSV '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    let mut out = Vec::new();
    for (idx, result) in reader.deserialize::<CohortRecord>().enumerate() {
        let rec = result.map_err(|e| AppError::new(2, format!("Cohort CSV line {}: {e}", idx + 2)))?;
        out.push(rec);
    }
    if out.is_empty() {
        return Err(AppError::new(3, format!("Cohort CSV '{}' has no records.", path.display())));
    }
    Ok(out)
}

/// Load the β table for meta-regression (`domain`, `beta`, optional width).
///
/// The CI width comes from `beta_ci_width`, or from `beta_ci_upper - beta_ci_lower`.
pub fn load_beta_table(path: &Path) -> Result<Vec<BetaRow>, AppError> {
    let (headers, mut reader) = open_csv(path)?;
    let header_map = build_header_map(&headers);
    let domain_idx = require_column(&header_map, "domain", path)?;
    let beta_idx = require_column(&header_map, "beta", path)?;
    let width_idx = header_map.get("beta_ci_width").copied();
    let lower_idx = header_map.get("beta_ci_lower").copied();
    let upper_idx = header_map.get("beta_ci_upper").copied();

    let mut out = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::new(2, format!("Beta CSV line {line}: {e}")))?;
        let Some(domain) = get_field(&record, domain_idx) else {
            warn!(line, "beta row without domain skipped");
            continue;
        };
        let beta = match parse_cell(&record, beta_idx) {
            Ok(v) => v,
            Err(e) => {
                warn!(line, error = %e, "beta row skipped");
                continue;
            }
        };
        let opt = |i: Option<usize>| i.and_then(|i| parse_cell(&record, i).ok());
        let beta_ci_width = opt(width_idx).or_else(|| Some(opt(upper_idx)? - opt(lower_idx)?));
        out.push(BetaRow {
            domain: domain.to_string(),
            beta,
            beta_ci_width,
        });
    }
    Ok(out)
}

/// Load the covariate table: `domain`, optional `field_type`, every other column numeric.
pub fn load_covariate_table(path: &Path) -> Result<CovariateTable, AppError> {
    let (headers, mut reader) = open_csv(path)?;
    let header_map = build_header_map(&headers);
    let domain_idx = require_column(&header_map, "domain", path)?;
    let field_type_idx = header_map.get("field_type").copied();

    // Keep the original header spelling for covariate names.
    let numeric: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != domain_idx && Some(*i) != field_type_idx)
        .map(|(i, name)| (i, name.trim().trim_start_matches('\u{feff}').to_string()))
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::new(2, format!("Covariate CSV line {line}: {e}")))?;
        let Some(domain) = get_field(&record, domain_idx) else {
            warn!(line, "covariate row without domain skipped");
            continue;
        };
        let values: BTreeMap<String, Option<f64>> = numeric
            .iter()
            .map(|(i, name)| (name.clone(), parse_cell(&record, *i).ok()))
            .collect();
        rows.push(CovariateRow {
            domain: domain.to_string(),
            field_type: field_type_idx.and_then(|i| get_field(&record, i)).map(str::to_string),
            values,
        });
    }

    Ok(CovariateTable {
        columns: numeric.into_iter().map(|(_, name)| name).collect(),
        rows,
    })
}

fn open_csv(path: &Path) -> Result<(StringRecord, csv::Reader<File>), AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers in '{}': {e}", path.display())))?
        .clone();
    Ok((headers, reader))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn require_column(header_map: &HashMap<String, usize>, name: &str, path: &Path) -> Result<usize, AppError> {
    header_map
        .get(&normalize_header_name(name))
        .copied()
        .ok_or_else(|| {
            AppError::new(
                2,
                format!("Missing required column `{name}` in '{}'.", path.display()),
            )
        })
}

fn get_field(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_cell(record: &StringRecord, idx: usize) -> Result<f64, String> {
    let s = get_field(record, idx).ok_or_else(|| "missing value".to_string())?;
    let v = s.parse::<f64>().map_err(|_| format!("not a number: '{s}'"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("non-finite value: '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn observations_skip_bad_rows_and_match_headers_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tmp(
            &dir,
            "obs.csv",
            "\u{feff}r,Response\n0.1,0.01\n0.2,abc\n0.3,0.2\n,0.4\n0.5,0.9\n",
        );
        let data = load_observations(&path, &ColumnSpec::default()).unwrap();
        assert_eq!(data.rows_read, 5);
        assert_eq!(data.rows_used, 3);
        assert_eq!(data.row_errors.len(), 2);
        assert_eq!(data.row_errors[0].line, 3);
        assert_eq!(data.stats.r_max, 0.5);
    }

    #[test]
    fn missing_column_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tmp(&dir, "obs.csv", "R,y\n0.1,0.2\n");
        let err = load_observations(&path, &ColumnSpec::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("response"));
    }

    #[test]
    fn too_few_rows_is_insufficient_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tmp(&dir, "obs.csv", "R,response\n0.1,0.2\n0.2,0.3\n");
        let err = load_observations(&path, &ColumnSpec::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn manifest_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tmp(
            &dir,
            "manifest.csv",
            "dataset,domain,path,r_column\nwais,climate,data/wais.csv,forcing\namoc,climate,/abs/amoc.csv,\n",
        );
        let entries = load_manifest(&path, &ColumnSpec::default()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, dir.path().join("data/wais.csv"));
        assert_eq!(entries[0].columns.r, "forcing");
        assert_eq!(entries[1].path, PathBuf::from("/abs/amoc.csv"));
        assert_eq!(entries[1].columns.r, "R");
    }

    #[test]
    fn beta_table_derives_width_from_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tmp(
            &dir,
            "beta.csv",
            "domain,beta,beta_ci_lower,beta_ci_upper\nclimate,4.0,3.5,4.7\nai,9.0,,\n",
        );
        let rows = load_beta_table(&path).unwrap();
        assert!((rows[0].beta_ci_width.unwrap() - 1.2).abs() < 1e-12);
        assert_eq!(rows[1].beta_ci_width, None);
    }

    #[test]
    fn covariate_table_keeps_original_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tmp(
            &dir,
            "cov.csv",
            "domain,field_type,C_eff,SNR\nclimate,physical,1.5,n/a\n",
        );
        let table = load_covariate_table(&path).unwrap();
        assert_eq!(table.columns, vec!["C_eff", "SNR"]);
        assert_eq!(table.rows[0].field_type.as_deref(), Some("physical"));
        assert_eq!(table.rows[0].values["C_eff"], Some(1.5));
        assert_eq!(table.rows[0].values["SNR"], None);
    }
}
