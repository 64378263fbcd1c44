//! Read/write JSON summary files.
//!
//! Every JSON artifact has a schema struct in `domain::files`; this module only
//! moves those structs to and from disk.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::FitSummaryFile;
use crate::error::AppError;

/// Write any summary struct as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", parent.display())))?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create JSON '{}': {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| AppError::new(2, format!("Failed to write JSON '{}': {e}", path.display())))?;
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush JSON '{}': {e}", path.display())))
}

/// Read a summary struct from JSON.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid JSON '{}': {e}", path.display())))
}

/// Read a `tfit fit` summary.
pub fn read_fit_summary(path: &Path) -> Result<FitSummaryFile, AppError> {
    read_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn written_json_is_complete_when_the_call_returns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/summary.json");
        // Large enough to span several BufWriter blocks.
        let value: BTreeMap<String, Vec<f64>> = (0..200)
            .map(|i| (format!("dataset_{i:03}"), vec![i as f64 * 0.5; 20]))
            .collect();

        write_json(&path, &value).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.trim_end().ends_with('}'));
        let back: BTreeMap<String, Vec<f64>> = read_json(&path).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_json::<BTreeMap<String, f64>>(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
