// Pivot transformer: long rows (one per key × category) → wide rows
//
// Output columns depend on the data: one column per distinct category seen in
// the input, so rows carry an ordered category → amount map instead of a
// fixed record type.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{info, warn};

use crate::table::{Table, Value};

/// Name of the computed row-wise sum column.
pub const TOTAL_COLUMN: &str = "total";

/// Index column names in output order.
pub const INDEX_COLUMNS: [&str; 5] = [
    "group",
    "issuer_id",
    "receiver_id",
    "transaction_id",
    "display_name",
];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PivotError {
    #[error("result set is missing expected column '{0}'")]
    MissingColumn(String),
}

/// Source column names used by the pivot.
#[derive(Debug, Clone)]
pub struct PivotSpec {
    pub group_column: String,
    pub issuer_column: String,
    pub receiver_column: String,
    pub transaction_column: String,
    pub display_name_column: String,
    pub category_column: String,
    pub measure_column: String,
}

/// Composite key identifying one output row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PivotKey {
    pub group: String,
    pub issuer_id: String,
    pub receiver_id: String,
    pub transaction_id: String,
    pub display_name: String,
}

impl PivotKey {
    fn fields(&self) -> [&str; 5] {
        [
            self.group.as_str(),
            self.issuer_id.as_str(),
            self.receiver_id.as_str(),
            self.transaction_id.as_str(),
            self.display_name.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    #[serde(flatten)]
    pub key: PivotKey,
    pub amounts: BTreeMap<String, f64>,
    pub total: f64,
}

impl PivotRow {
    /// Amount for `category`, zero when the key never had it.
    pub fn amount(&self, category: &str) -> f64 {
        self.amounts.get(category).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PivotTable {
    pub measure: String,
    pub categories: Vec<String>,
    pub rows: Vec<PivotRow>,
    /// Measure cells that were null or not numeric and counted as zero.
    pub coerced_to_zero: usize,
    /// Input rows dropped because an identifier or category cell was null.
    pub skipped_rows: usize,
}

impl PivotTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Index columns, then one column per category, then the total.
    pub fn columns(&self) -> Vec<String> {
        INDEX_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.categories.iter().cloned())
            .chain(std::iter::once(TOTAL_COLUMN.to_string()))
            .collect()
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new(self.columns());
        for row in &self.rows {
            let values = row
                .key
                .fields()
                .iter()
                .map(|f| Value::from(*f))
                .chain(self.categories.iter().map(|c| Value::Real(row.amount(c))))
                .chain(std::iter::once(Value::Real(row.total)))
                .collect();
            table.push_row(values);
        }
        table
    }
}

/// Reshape `raw` into one row per composite key, summing the measure per
/// category. Absent key/category combinations are zero.
pub fn pivot(raw: &Table, spec: &PivotSpec) -> Result<PivotTable, PivotError> {
    if raw.is_empty() {
        return Ok(PivotTable {
            measure: spec.measure_column.clone(),
            ..PivotTable::default()
        });
    }

    let column = |name: &str| {
        raw.column_index(name)
            .ok_or_else(|| PivotError::MissingColumn(name.to_string()))
    };
    let key_columns = [
        column(&spec.group_column)?,
        column(&spec.issuer_column)?,
        column(&spec.receiver_column)?,
        column(&spec.transaction_column)?,
        column(&spec.display_name_column)?,
    ];
    let category_col = column(&spec.category_column)?;
    let measure_col = column(&spec.measure_column)?;

    let mut grouped: BTreeMap<PivotKey, BTreeMap<String, f64>> = BTreeMap::new();
    let mut categories = BTreeSet::new();
    let mut coerced_to_zero = 0;
    let mut skipped_rows = 0;

    for row in &raw.rows {
        let (Some(key), Some(category)) = (
            key_for(row, &key_columns),
            row[category_col].as_key(),
        ) else {
            skipped_rows += 1;
            continue;
        };

        let amount = match row[measure_col].as_f64() {
            Some(amount) => amount,
            None => {
                coerced_to_zero += 1;
                0.0
            }
        };

        *grouped
            .entry(key)
            .or_default()
            .entry(category.clone())
            .or_insert(0.0) += amount;
        categories.insert(category);
    }

    if coerced_to_zero > 0 {
        warn!(
            measure = %spec.measure_column,
            count = coerced_to_zero,
            "non-numeric measure values counted as zero"
        );
    }
    if skipped_rows > 0 {
        warn!(count = skipped_rows, "rows with null identifier or category skipped");
    }

    let renames = reserved_renames(&categories);
    if !renames.is_empty() {
        warn!(?renames, "categories clashing with output column names renamed");
        categories = categories
            .into_iter()
            .map(|c| renames.get(&c).cloned().unwrap_or(c))
            .collect();
        for amounts in grouped.values_mut() {
            for (from, to) in &renames {
                if let Some(amount) = amounts.remove(from) {
                    amounts.insert(to.clone(), amount);
                }
            }
        }
    }

    let categories: Vec<String> = categories.into_iter().collect();
    let rows: Vec<PivotRow> = grouped
        .into_iter()
        .map(|(key, mut amounts)| {
            for category in &categories {
                amounts.entry(category.clone()).or_insert(0.0);
            }
            let total = amounts.values().sum();
            PivotRow {
                key,
                amounts,
                total,
            }
        })
        .collect();

    info!(
        measure = %spec.measure_column,
        rows = rows.len(),
        categories = categories.len(),
        "pivot complete"
    );

    Ok(PivotTable {
        measure: spec.measure_column.clone(),
        categories,
        rows,
        coerced_to_zero,
        skipped_rows,
    })
}

/// New names for categories equal to an index column or the total column.
/// The first free `<name>_<n>` suffix is used.
fn reserved_renames(categories: &BTreeSet<String>) -> BTreeMap<String, String> {
    let mut taken: BTreeSet<String> = categories.clone();
    taken.extend(INDEX_COLUMNS.iter().map(|c| c.to_string()));
    taken.insert(TOTAL_COLUMN.to_string());

    let mut renames = BTreeMap::new();
    for category in categories {
        let reserved = INDEX_COLUMNS.contains(&category.as_str()) || category == TOTAL_COLUMN;
        if !reserved {
            continue;
        }
        let renamed = (1..)
            .map(|n| format!("{}_{}", category, n))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_else(|| category.clone());
        taken.insert(renamed.clone());
        renames.insert(category.clone(), renamed);
    }
    renames
}

/// Build the composite key for a raw row. A null identifier column yields
/// `None`; a null display name (no match in the reference table) is blank.
fn key_for(row: &[Value], columns: &[usize; 5]) -> Option<PivotKey> {
    Some(PivotKey {
        group: row[columns[0]].as_key()?,
        issuer_id: row[columns[1]].as_key()?,
        receiver_id: row[columns[2]].as_key()?,
        transaction_id: row[columns[3]].as_key()?,
        display_name: row[columns[4]].as_key().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec() -> PivotSpec {
        PivotSpec {
            group_column: "group".to_string(),
            issuer_column: "EmisorRFC".to_string(),
            receiver_column: "ReceptorRFC".to_string(),
            transaction_column: "UUID".to_string(),
            display_name_column: "display_name".to_string(),
            category_column: "PercepcionClave".to_string(),
            measure_column: "PercepcionImporteGravado".to_string(),
        }
    }

    fn raw(rows: &[(&str, &str, &str, Value)]) -> Table {
        let mut table = Table::new(
            [
                "group",
                "EmisorRFC",
                "ReceptorRFC",
                "UUID",
                "PercepcionClave",
                "PercepcionImporteGravado",
                "display_name",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        );
        for (receiver, uuid, category, amount) in rows {
            table.push_row(vec![
                Value::from("Finance"),
                Value::from("AAA010101AAA"),
                Value::from(*receiver),
                Value::from(*uuid),
                Value::from(*category),
                amount.clone(),
                Value::from("J"),
            ]);
        }
        table
    }

    #[test]
    fn test_two_categories_same_key() {
        let input = raw(&[
            ("X", "U1", "BASE", Value::Integer(100)),
            ("X", "U1", "BONUS", Value::Integer(50)),
        ]);

        let result = pivot(&input, &spec()).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result.categories, vec!["BASE", "BONUS"]);
        let row = &result.rows[0];
        assert_eq!(row.key.group, "Finance");
        assert_eq!(row.key.display_name, "J");
        assert_eq!(row.amount("BASE"), 100.0);
        assert_eq!(row.amount("BONUS"), 50.0);
        assert_eq!(row.total, 150.0);
    }

    #[test]
    fn test_shape_and_totals() {
        let input = raw(&[
            ("X", "U1", "001", Value::from("10.5")),
            ("X", "U1", "001", Value::from("4.5")),
            ("Y", "U2", "002", Value::Integer(3)),
            ("Z", "U3", "019", Value::Real(1.25)),
            ("Z", "U3", "001", Value::from("2")),
        ]);

        let result = pivot(&input, &spec()).unwrap();

        // 3 distinct keys, 3 distinct categories
        assert_eq!(result.len(), 3);
        assert_eq!(result.categories.len(), 3);
        assert_eq!(result.columns().len(), INDEX_COLUMNS.len() + 3 + 1);

        for row in &result.rows {
            let sum: f64 = result.categories.iter().map(|c| row.amount(c)).sum();
            assert_eq!(row.total, sum);
        }
        assert_eq!(result.rows[0].amount("001"), 15.0);
        assert_eq!(result.rows[1].amount("001"), 0.0);
        assert_eq!(result.rows[2].total, 3.25);
    }

    #[test]
    fn test_non_numeric_counts_as_zero() {
        let input = raw(&[
            ("X", "U1", "BASE", Value::from("abc")),
            ("X", "U1", "BONUS", Value::Null),
            ("X", "U1", "EXTRA", Value::from("7")),
        ]);

        let result = pivot(&input, &spec()).unwrap();

        assert_eq!(result.coerced_to_zero, 2);
        assert_eq!(result.rows[0].amount("BASE"), 0.0);
        assert_eq!(result.rows[0].total, 7.0);
    }

    #[test]
    fn test_null_identifier_rows_skipped() {
        let mut input = raw(&[
            ("X", "U1", "BASE", Value::Integer(1)),
            ("Y", "U2", "BASE", Value::Integer(2)),
            ("Z", "U3", "BASE", Value::Integer(4)),
        ]);
        let uuid_col = input.column_index("UUID").unwrap();
        let category_col = input.column_index("PercepcionClave").unwrap();
        input.rows[1][uuid_col] = Value::Null;
        input.rows[2][category_col] = Value::Null;

        let result = pivot(&input, &spec()).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result.skipped_rows, 2);
    }

    #[test]
    fn test_unresolved_name_kept_blank() {
        let mut input = raw(&[("X", "U1", "BASE", Value::Integer(1))]);
        let name_col = input.column_index("display_name").unwrap();
        input.rows[0][name_col] = Value::Null;

        let result = pivot(&input, &spec()).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0].key.display_name, "");
        assert_eq!(result.skipped_rows, 0);
    }

    #[test]
    fn test_missing_column() {
        let mut input = raw(&[("X", "U1", "BASE", Value::Integer(1))]);
        input.columns[4] = "DeduccionClave".to_string();

        assert_eq!(
            pivot(&input, &spec()),
            Err(PivotError::MissingColumn("PercepcionClave".to_string()))
        );
    }

    #[test]
    fn test_empty_input_is_empty_output() {
        let result = pivot(&Table::empty(), &spec()).unwrap();

        assert!(result.is_empty());
        assert!(result.categories.is_empty());
    }

    #[test]
    fn test_rerun_is_identical() {
        let input = raw(&[
            ("X", "U1", "BASE", Value::Integer(100)),
            ("Y", "U2", "BONUS", Value::from("x")),
        ]);

        let first = pivot(&input, &spec()).unwrap();
        let second = pivot(&input, &spec()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.to_table(), second.to_table());
    }

    #[test]
    fn test_to_table_layout() {
        let input = raw(&[
            ("X", "U1", "BASE", Value::Integer(100)),
            ("X", "U1", "BONUS", Value::Integer(50)),
        ]);

        let table = pivot(&input, &spec()).unwrap().to_table();

        assert_eq!(
            table.columns,
            vec![
                "group",
                "issuer_id",
                "receiver_id",
                "transaction_id",
                "display_name",
                "BASE",
                "BONUS",
                "total"
            ]
        );
        assert_eq!(table.cell(0, "total"), Some(&Value::Real(150.0)));
        assert_eq!(table.cell(0, "receiver_id"), Some(&Value::from("X")));
    }

    #[test]
    fn test_category_named_like_output_column_is_renamed() {
        let input = raw(&[
            ("X", "U1", "total", Value::Integer(5)),
            ("X", "U1", "group", Value::Integer(7)),
            ("X", "U1", "total_1", Value::Integer(1)),
        ]);

        let result = pivot(&input, &spec()).unwrap();
        let table = result.to_table();

        assert_eq!(result.categories, vec!["group_1", "total_1", "total_2"]);
        let mut headers = table.columns.clone();
        headers.sort();
        headers.dedup();
        assert_eq!(headers.len(), table.columns.len());
        assert_eq!(table.cell(0, "total"), Some(&Value::Real(13.0)));
        assert_eq!(table.cell(0, "total_2"), Some(&Value::Real(5.0)));
        assert_eq!(table.cell(0, "group_1"), Some(&Value::Real(7.0)));
        assert_eq!(table.cell(0, "group"), Some(&Value::from("Finance")));
    }
}
