// Query builder/executor: catalog group → filtered rows from a report table
//
// The identifier list is bound as parameters, never spliced into the SQL.
// Table, column and collation names come from configuration and are quoted
// or validated before they reach the statement.

use rusqlite::{params_from_iter, Connection};
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::table::{Table, Value};

/// Upper bound on identifiers per query. Identifiers past this point in
/// catalog order are not queried.
pub const MAX_IDENTIFIERS: usize = 1000;

/// Column injected at the front of every row with the queried group.
pub const GROUP_COLUMN: &str = "group";

/// Column carrying the name resolved through the reference table.
pub const DISPLAY_NAME_COLUMN: &str = "display_name";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid collation name '{0}'")]
    InvalidCollation(String),

    #[error("query against {table} failed: {source}")]
    Execution {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// Reference table joined on the receiver column to resolve a display name.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub table: String,
    pub key_column: String,
    pub name_column: String,
    /// Applied to both sides of the join predicate so that tables with
    /// different collations still compare equal.
    pub collation: String,
}

/// Everything needed to query one report table.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub table: String,
    pub issuer_column: String,
    pub receiver_column: String,
    pub join: Option<JoinSpec>,
}

/// SQL text plus the identifiers bound to its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<String>,
}

impl QueryPlan {
    /// Build the statement for `identifiers`, keeping only the first
    /// [`MAX_IDENTIFIERS`].
    pub fn build(&self, identifiers: &[&str]) -> Result<BuiltQuery, QueryError> {
        let capped = &identifiers[..identifiers.len().min(MAX_IDENTIFIERS)];
        if capped.len() < identifiers.len() {
            debug!(
                requested = identifiers.len(),
                kept = capped.len(),
                "identifier list truncated"
            );
        }

        let placeholders = (1..=capped.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let (select_name, join_clause) = match &self.join {
            Some(join) => {
                let collation = validate_collation(&join.collation)?;
                let key = quote_ident(&join.key_column);
                // One reference row per key, so the join never multiplies
                // source rows
                (
                    format!("T2.ref_name AS {}", DISPLAY_NAME_COLUMN),
                    format!(
                        " LEFT JOIN (SELECT MIN({key}) AS ref_key, MIN({name}) AS ref_name \
                         FROM {table} GROUP BY {key} COLLATE {collation}) AS T2 \
                         ON T1.{receiver} COLLATE {collation} = T2.ref_key COLLATE {collation}",
                        key = key,
                        name = quote_ident(&join.name_column),
                        table = quote_table(&join.table),
                        receiver = quote_ident(&self.receiver_column),
                        collation = collation,
                    ),
                )
            }
            None => (format!("'' AS {}", DISPLAY_NAME_COLUMN), String::new()),
        };

        let sql = format!(
            "SELECT T1.*, {} FROM {} AS T1{} WHERE T1.{} IN ({})",
            select_name,
            quote_table(&self.table),
            join_clause,
            quote_ident(&self.issuer_column),
            placeholders
        );

        Ok(BuiltQuery {
            sql,
            params: capped.iter().map(|s| s.to_string()).collect(),
        })
    }
}

pub fn try_execute(
    conn: &Connection,
    catalog: &Catalog,
    plan: &QueryPlan,
    group: &str,
) -> Result<Table, QueryError> {
    let identifiers = catalog.identifiers_for(group);
    if identifiers.is_empty() {
        debug!(group, "no identifiers for group, skipping query");
        return Ok(Table::empty());
    }

    let query = plan.build(&identifiers)?;
    let to_query_error = |source| QueryError::Execution {
        table: plan.table.clone(),
        source,
    };

    let mut stmt = conn.prepare(&query.sql).map_err(to_query_error)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = columns.len();

    let mut table = Table::new(columns);
    let mut rows = stmt
        .query(params_from_iter(query.params.iter()))
        .map_err(to_query_error)?;

    while let Some(row) = rows.next().map_err(to_query_error)? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(Value::from(row.get_ref(i).map_err(to_query_error)?));
        }
        table.push_row(values);
    }

    table.insert_column(0, GROUP_COLUMN, Value::from(group));

    info!(
        group,
        table = %plan.table,
        identifiers = query.params.len(),
        rows = table.len(),
        "report query complete"
    );

    Ok(table)
}

/// Quote a single identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name. Bracketed parts
/// (`[dbo].[Tabla]`) are accepted and re-quoted.
pub fn quote_table(name: &str) -> String {
    if name.starts_with('[') && name.contains("].[") {
        return name
            .split("].[")
            .map(|part| quote_ident(part.trim_matches(|c| c == '[' || c == ']')))
            .collect::<Vec<_>>()
            .join(".");
    }
    quote_ident(name.trim_matches(|c| c == '[' || c == ']'))
}

fn validate_collation(name: &str) -> Result<&str, QueryError> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(QueryError::InvalidCollation(name.to_string()))
    }
}
