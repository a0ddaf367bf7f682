//! CSV writers for the run results and the annotated input rows.

use crate::models::ResultTable;
use anyhow::{Context, Result, ensure};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::info;

/// `fpds_results_{}.csv` + timestamp → `fpds_results_20240131_120000.csv`
pub fn results_file_name(pattern: &str, date_format: &str, now: DateTime<Local>) -> String {
    pattern.replace("{}", &now.format(date_format).to_string())
}

/// Header row of column names, then one row per record.
pub fn write_results(table: &ResultTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;

    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.values.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;

    info!("Wrote {} records to {:?}", table.len(), path);
    Ok(())
}

/// Input header and rows, with one extra status column appended.
pub fn write_status_sheet(
    header: &[String],
    rows: &[Vec<String>],
    flags: &[bool],
    status_column: &str,
    path: &Path,
) -> Result<()> {
    ensure!(
        rows.len() == flags.len(),
        "{} rows but {} status flags",
        rows.len(),
        flags.len()
    );

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;

    writer.write_record(header.iter().map(String::as_str).chain([status_column]))?;
    for (row, found) in rows.iter().zip(flags) {
        let status = if *found { "True" } else { "False" };
        writer.write_record(row.iter().map(String::as_str).chain([status]))?;
    }
    writer.flush()?;

    info!("Wrote status for {} rows to {:?}", rows.len(), path);
    Ok(())
}

/// Rows copied through unchanged under the input header.
pub fn write_rows(header: &[String], rows: &[Vec<String>], path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;

    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    Ok(dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedRecord, FieldValue};
    use chrono::TimeZone;

    #[test]
    fn test_results_file_name() {
        let now = Local.with_ymd_and_hms(2024, 1, 31, 12, 5, 9).unwrap();
        assert_eq!(
            results_file_name("fpds_results_{}.csv", "%Y%m%d_%H%M%S", now),
            "fpds_results_20240131_120509.csv"
        );
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let table = ResultTable::with_rows(
            vec!["PIID".into(), "Small".into(), "Notes".into()],
            vec![ExtractedRecord {
                source_url: "https://fpds.test/1".into(),
                values: vec![
                    FieldValue::Text("W9, 12".into()),
                    FieldValue::Flag(true),
                    FieldValue::Null,
                ],
            }],
        );
        write_results(&table, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "PIID,Small,Notes\n\"W9, 12\",True,\n");
    }

    #[test]
    fn test_write_status_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.csv");
        let header = vec!["Search Name".to_string(), "Vendor".to_string()];
        let rows = vec![
            vec!["Acme".to_string(), "A".to_string()],
            vec!["Beta".to_string(), "B".to_string()],
        ];
        write_status_sheet(&header, &rows, &[true, false], "Found", &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "Search Name,Vendor,Found\nAcme,A,True\nBeta,B,False\n");
    }

    #[test]
    fn test_status_sheet_rejects_misaligned_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.csv");
        let rows = vec![vec!["Acme".to_string()]];
        assert!(write_status_sheet(&["Search Name".into()], &rows, &[], "Found", &path).is_err());
    }

    #[test]
    fn test_write_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skipped.csv");
        write_rows(&["A".into(), "B".into()], &[vec!["1".into(), "".into()]], &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A,B\n1,\n");
    }
}
