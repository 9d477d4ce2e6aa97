// Export of the current result to CSV or Excel, chosen by file extension
//
// The whole file is rendered in memory first and written in one step, so a
// failed render never leaves a half-written file behind.

use chrono::NaiveDateTime;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::table::{Table, Value};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("there is no data to export")]
    NoData,

    #[error("failed to render CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to render workbook: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    /// `.xlsx` (any case) selects a workbook; everything else is CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("xlsx") => ExportFormat::Xlsx,
            _ => ExportFormat::Csv,
        }
    }
}

/// Default export file name: `<report>_<group>_<YYYYmmdd_HHMMSS>.csv`, with
/// anything outside `[A-Za-z0-9_-]` in the group replaced by `_`.
pub fn suggested_file_name(report: &str, group: &str, at: NaiveDateTime) -> String {
    let group: String = group
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!(
        "{}_{}_{}.csv",
        report.to_lowercase(),
        group,
        at.format("%Y%m%d_%H%M%S")
    )
}

pub fn export_table(table: &Table, path: &Path) -> Result<ExportFormat, ExportError> {
    if table.is_empty() {
        return Err(ExportError::NoData);
    }

    let format = ExportFormat::from_path(path);
    let bytes = match format {
        ExportFormat::Csv => render_csv(table)?,
        ExportFormat::Xlsx => render_xlsx(table)?,
    };

    std::fs::write(path, bytes).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), rows = table.len(), ?format, "export complete");
    Ok(format)
}

fn render_csv(table: &Table) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(csv::Error::from(e.into_error())))
}

fn render_xlsx(table: &Table) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();

    for (col, name) in table.columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, name, &header)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (c, value) in row.iter().enumerate() {
            let c = c as u16;
            match value {
                Value::Null => {}
                Value::Integer(i) => {
                    sheet.write_number(r, c, *i as f64)?;
                }
                Value::Real(f) => {
                    sheet.write_number(r, c, *f)?;
                }
                Value::Text(s) => {
                    sheet.write_string(r, c, s)?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_auto, Data, Reader};

    fn sample() -> Table {
        let mut table = Table::new(vec![
            "group".to_string(),
            "display_name".to_string(),
            "total".to_string(),
        ]);
        table.push_row(vec![
            Value::from("Finance"),
            Value::from("PÉREZ, JUANA"),
            Value::Real(150.0),
        ]);
        table.push_row(vec![Value::from("Finance"), Value::Null, Value::Real(2.5)]);
        table
    }

    #[test]
    fn test_format_by_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("a.xlsx")), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::from_path(Path::new("a.XLSX")), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::from_path(Path::new("a.csv")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("report")), ExportFormat::Csv);
    }

    #[test]
    fn test_suggested_file_name() {
        let at = chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();

        assert_eq!(
            suggested_file_name("Percepciones", "Secretaría de Salud", at),
            "percepciones_Secretar_a_de_Salud_20240309_140500.csv"
        );
    }

    #[test]
    fn test_csv_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");

        assert_eq!(export_table(&sample(), &path).unwrap(), ExportFormat::Csv);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "group,display_name,total");
        assert_eq!(lines[1], "Finance,\"PÉREZ, JUANA\",150");
        assert_eq!(lines[2], "Finance,,2.5");
    }

    #[test]
    fn test_xlsx_export_keeps_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");

        assert_eq!(export_table(&sample(), &path).unwrap(), ExportFormat::Xlsx);

        let mut workbook = open_workbook_auto(&path).unwrap();
        let range = workbook.worksheet_range_at(0).unwrap().unwrap();
        assert_eq!(range.get_value((0, 2)), Some(&Data::String("total".to_string())));
        assert_eq!(range.get_value((1, 2)), Some(&Data::Float(150.0)));
    }

    #[test]
    fn test_empty_table_refused_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        assert!(matches!(
            export_table(&Table::empty(), &path),
            Err(ExportError::NoData)
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_unwritable_path_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("report.csv");

        assert!(matches!(
            export_table(&sample(), &path),
            Err(ExportError::Io { .. })
        ));
    }
}
