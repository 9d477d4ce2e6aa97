// Catalog of taxpayer identifiers (RFC) grouped by dependency
//
// Loaded once at startup from a spreadsheet. Only the first two columns of
// the first worksheet are read; the header row is ignored and the columns
// are renamed to identifier/group.

use calamine::{open_workbook_auto, Data, Reader};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

use crate::error::ReportError;
use crate::table::format_number;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to open catalog workbook {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("catalog workbook {0} has no worksheets")]
    NoWorksheet(PathBuf),

    #[error("catalog worksheet must have at least two columns, found {0}")]
    Layout(usize),
}

/// One identifier → group pair. Both fields are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub identifier: String,
    pub group: String,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    load_error: Option<String>,
}

impl Catalog {
    /// Load the catalog, degrading to an empty catalog on any failure.
    ///
    /// The failure is logged and kept in [`Catalog::load_error`] so the caller
    /// can report degraded mode.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(catalog) => {
                info!(
                    path = %path.display(),
                    entries = catalog.len(),
                    "catalog loaded"
                );
                catalog
            }
            Err(e) => {
                let e = ReportError::from(e);
                error!(path = %path.display(), error = %e, "failed to load catalog");
                Self {
                    entries: Vec::new(),
                    load_error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, CatalogError> {
        let mut workbook = open_workbook_auto(path).map_err(|e| CatalogError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| CatalogError::NoWorksheet(path.to_path_buf()))?
            .map_err(|e| CatalogError::Open {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        // The range only covers used cells; columns A and B are read by
        // absolute position so an empty column A is not skipped over.
        let (Some((first_row, _)), Some((last_row, last_col))) = (range.start(), range.end())
        else {
            return Err(CatalogError::Layout(0));
        };
        let columns = last_col as usize + 1;
        if columns < 2 {
            return Err(CatalogError::Layout(columns));
        }

        // First used row is the header
        let rows = (first_row + 1..=last_row).map(|r| {
            (
                range.get_value((r, 0)).and_then(cell_text),
                range.get_value((r, 1)).and_then(cell_text),
            )
        });

        Ok(Self::from_rows(rows))
    }

    /// Build a catalog from raw (identifier, group) pairs, dropping any pair
    /// with a missing or blank value.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (Option<String>, Option<String>)>,
    {
        let entries = rows
            .into_iter()
            .filter_map(|(identifier, group)| {
                let identifier = identifier?.trim().to_string();
                let group = group?.trim().to_string();
                if identifier.is_empty() || group.is_empty() {
                    return None;
                }
                Some(CatalogEntry { identifier, group })
            })
            .collect();

        Self {
            entries,
            load_error: None,
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Sorted distinct groups, for the selection control.
    pub fn list_groups(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.group.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Identifiers whose group matches exactly, in catalog order.
    pub fn identifiers_for(&self, group: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.group == group)
            .map(|e| e.identifier.as_str())
            .collect()
    }

    /// Groups containing `text`, ignoring case. Blank text matches everything.
    pub fn filter_groups(&self, text: &str) -> Vec<String> {
        let needle = text.trim().to_lowercase();
        self.list_groups()
            .into_iter()
            .filter(|g| needle.is_empty() || g.to_lowercase().contains(&needle))
            .collect()
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(format_number(*f)),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_xlsxwriter::Workbook;

    fn sample() -> Catalog {
        Catalog::from_rows(vec![
            (Some("AAA010101AAA".into()), Some("Finance".into())),
            (Some("BBB020202BBB".into()), Some("Finance".into())),
            (Some("CCC030303CCC".into()), Some("HR".into())),
        ])
    }

    #[test]
    fn test_identifiers_for_exact_match() {
        let catalog = sample();

        assert_eq!(
            catalog.identifiers_for("Finance"),
            vec!["AAA010101AAA", "BBB020202BBB"]
        );
        assert_eq!(catalog.identifiers_for("HR"), vec!["CCC030303CCC"]);
        assert!(catalog.identifiers_for("finance").is_empty());
        assert!(catalog.identifiers_for("Fin").is_empty());
    }

    #[test]
    fn test_incomplete_rows_dropped() {
        let catalog = Catalog::from_rows(vec![
            (Some("AAA010101AAA".into()), Some("Finance".into())),
            (None, Some("Finance".into())),
            (Some("BBB020202BBB".into()), None),
            (Some("   ".into()), Some("HR".into())),
            (Some(" DDD040404DDD ".into()), Some(" HR ".into())),
        ]);

        assert_eq!(
            catalog.entries(),
            &[
                CatalogEntry {
                    identifier: "AAA010101AAA".into(),
                    group: "Finance".into()
                },
                CatalogEntry {
                    identifier: "DDD040404DDD".into(),
                    group: "HR".into()
                },
            ]
        );
    }

    #[test]
    fn test_groups_sorted_and_filtered() {
        let catalog = Catalog::from_rows(vec![
            (Some("1".into()), Some("Salud".into())),
            (Some("2".into()), Some("Educacion".into())),
            (Some("3".into()), Some("Salud".into())),
            (Some("4".into()), Some("Seguridad Social".into())),
        ]);

        assert_eq!(
            catalog.list_groups(),
            vec!["Educacion", "Salud", "Seguridad Social"]
        );
        assert_eq!(catalog.filter_groups("SAL"), vec!["Salud"]);
        assert_eq!(catalog.filter_groups("A"), vec!["Educacion", "Salud", "Seguridad Social"]);
        assert_eq!(catalog.filter_groups("").len(), 3);
    }

    #[test]
    fn test_load_from_workbook_ignores_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalogo.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "RFC Emisor").unwrap();
        sheet.write_string(0, 1, "Nombre Dependencia").unwrap();
        sheet.write_string(0, 2, "Extra").unwrap();
        sheet.write_string(1, 0, "AAA010101AAA").unwrap();
        sheet.write_string(1, 1, "Finance").unwrap();
        sheet.write_string(1, 2, "ignored").unwrap();
        // row 2 misses its group
        sheet.write_string(2, 0, "BBB020202BBB").unwrap();
        sheet.write_string(3, 0, "CCC030303CCC").unwrap();
        sheet.write_string(3, 1, "HR").unwrap();
        workbook.save(&path).unwrap();

        let catalog = Catalog::try_load(&path).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.identifiers_for("Finance"), vec!["AAA010101AAA"]);
        assert_eq!(catalog.identifiers_for("HR"), vec!["CCC030303CCC"]);
    }

    #[test]
    fn test_single_column_workbook_is_layout_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one_column.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "RFC").unwrap();
        sheet.write_string(1, 0, "AAA010101AAA").unwrap();
        workbook.save(&path).unwrap();

        assert!(matches!(
            Catalog::try_load(&path),
            Err(CatalogError::Layout(1))
        ));
    }

    #[test]
    fn test_columns_read_by_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shifted.xlsx");

        // Column A left empty: B and C must not stand in for A and B
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 1, "RFC Emisor").unwrap();
        sheet.write_string(0, 2, "Nombre Dependencia").unwrap();
        sheet.write_string(1, 1, "AAA010101AAA").unwrap();
        sheet.write_string(1, 2, "Finance").unwrap();
        workbook.save(&path).unwrap();

        let catalog = Catalog::try_load(&path).unwrap();

        assert!(catalog.is_empty());
        assert!(catalog.identifiers_for("Finance").is_empty());
    }

    #[test]
    fn test_missing_file_degrades_to_empty() {
        let catalog = Catalog::load(Path::new("/nonexistent/catalogo.xlsx"));

        assert!(catalog.is_empty());
        assert!(catalog.list_groups().is_empty());
        assert!(catalog.load_error().is_some());
    }
}
