// Nomina Report - Core Library
// Exposes all modules for use in the CLI, the terminal UI, and tests

pub mod catalog;
pub mod config;
pub mod db;
pub mod debounce;
pub mod error;
pub mod export;
pub mod logging;
pub mod pivot;
pub mod query;
pub mod session;
pub mod table;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogEntry, CatalogError};
pub use config::{
    AppConfig, ColumnSettings, DbSettings, PathSettings, ReferenceSettings, TableSettings,
};
pub use db::{ConnectionError, ConnectionManager};
pub use debounce::{Debouncer, DROPDOWN_DELAY};
pub use error::{ReportError, Result};
pub use export::{export_table, suggested_file_name, ExportError, ExportFormat};
pub use pivot::{pivot, PivotError, PivotKey, PivotRow, PivotSpec, PivotTable, INDEX_COLUMNS, TOTAL_COLUMN};
pub use query::{JoinSpec, QueryError, QueryPlan, MAX_IDENTIFIERS};
pub use session::{
    ConnectionStatus, Notice, NoticeLevel, PendingQuery, QueryOutcome, QueryState,
    ReportDefinition, ReportKind, Session,
};
pub use table::{format_number, Table, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
