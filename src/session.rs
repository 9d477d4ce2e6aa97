// Application context: one connection, one catalog, one current result
//
// Built once at startup and passed to the front end. Every failure past
// startup is caught here, logged, and queued as a `Notice` for the user.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::db::ConnectionManager;
use crate::error::ReportError;
use crate::export::export_table;
use crate::pivot::{pivot, PivotSpec, PivotTable};
use crate::query::{self, JoinSpec, QueryPlan, DISPLAY_NAME_COLUMN, GROUP_COLUMN};

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReportKind {
    Perceptions,
    Deductions,
}

impl ReportKind {
    pub const ALL: [ReportKind; 2] = [ReportKind::Perceptions, ReportKind::Deductions];

    pub fn title(&self) -> &'static str {
        match self {
            ReportKind::Perceptions => "Percepciones",
            ReportKind::Deductions => "Deducciones",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            ReportKind::Perceptions => ReportKind::Deductions,
            ReportKind::Deductions => ReportKind::Perceptions,
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "perceptions" | "percepciones" => Ok(ReportKind::Perceptions),
            "deductions" | "deducciones" => Ok(ReportKind::Deductions),
            other => Err(format!(
                "unknown report '{}', expected percepciones or deducciones",
                other
            )),
        }
    }
}

/// Table, category column and selectable measures of one report.
#[derive(Debug, Clone)]
pub struct ReportDefinition {
    pub kind: ReportKind,
    pub table: String,
    pub category_column: String,
    pub measures: Vec<String>,
}

impl ReportDefinition {
    pub fn default_measure(&self) -> &str {
        self.measures.first().map(String::as_str).unwrap_or_default()
    }

    fn from_config(kind: ReportKind, config: &AppConfig) -> Self {
        match kind {
            ReportKind::Perceptions => Self {
                kind,
                table: config.tables.percepciones.clone(),
                category_column: "PercepcionClave".to_string(),
                measures: vec![
                    "PercepcionImporteGravado".to_string(),
                    "PercepcionImporteExento".to_string(),
                ],
            },
            ReportKind::Deductions => Self {
                kind,
                table: config.tables.deducciones.clone(),
                category_column: "DeduccionClave".to_string(),
                measures: vec!["DeduccionImporte".to_string()],
            },
        }
    }
}

// ============================================================================
// NOTICES & STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message the front end must show to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    /// Connected, but the catalog is empty so there is nothing to query.
    ConnectedCatalogError,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    Querying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    HasData(usize),
    Empty,
    Failed,
    /// Not started: invalid input, not connected, or already querying.
    Rejected,
}

/// A validated query waiting to run. Obtained from [`Session::start_query`].
#[derive(Debug)]
pub struct PendingQuery {
    kind: ReportKind,
    group: String,
    measure: String,
}

// ============================================================================
// SESSION
// ============================================================================

pub struct Session {
    config: AppConfig,
    db: ConnectionManager,
    catalog: Catalog,
    reports: Vec<ReportDefinition>,
    current: PivotTable,
    state: QueryState,
    notices: VecDeque<Notice>,
}

impl Session {
    /// Build the session and load the catalog. Does not connect yet.
    pub fn new(config: AppConfig) -> Self {
        let catalog = Catalog::load(&config.paths.catalog_path);
        let db = ConnectionManager::new(config.sql_server.clone());
        Self::from_parts(config, db, catalog)
    }

    pub fn from_parts(config: AppConfig, db: ConnectionManager, catalog: Catalog) -> Self {
        let reports = ReportKind::ALL
            .iter()
            .map(|&kind| ReportDefinition::from_config(kind, &config))
            .collect();

        Self {
            config,
            db,
            catalog,
            reports,
            current: PivotTable::default(),
            state: QueryState::Idle,
            notices: VecDeque::new(),
        }
    }

    /// Connect (if needed) and classify the session's readiness. Safe to call
    /// again as a manual retry after a connection failure.
    pub fn initialize(&mut self) -> ConnectionStatus {
        if !self.db.connect() {
            let message = self
                .db
                .last_error()
                .cloned()
                .map(|e| ReportError::from(e).to_string())
                .unwrap_or_else(|| "unknown connection error".to_string());
            self.notify(NoticeLevel::Error, "Connection error", message);
            return ConnectionStatus::Disconnected;
        }

        if self.catalog.is_empty() {
            let message = match self.catalog.load_error() {
                Some(e) => format!("The catalog could not be loaded: {}", e),
                None => "The catalog has no complete rows.".to_string(),
            };
            self.notify(NoticeLevel::Warning, "Catalog error", message);
            return ConnectionStatus::ConnectedCatalogError;
        }

        ConnectionStatus::Connected
    }

    pub fn status(&self) -> ConnectionStatus {
        if !self.db.is_connected() {
            ConnectionStatus::Disconnected
        } else if self.catalog.is_empty() {
            ConnectionStatus::ConnectedCatalogError
        } else {
            ConnectionStatus::Connected
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn report(&self, kind: ReportKind) -> &ReportDefinition {
        self.reports
            .iter()
            .find(|r| r.kind == kind)
            .unwrap_or(&self.reports[0])
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    /// Whether the "run query" trigger should be enabled.
    pub fn can_query(&self) -> bool {
        self.state == QueryState::Idle && self.db.is_connected()
    }

    pub fn current(&self) -> &PivotTable {
        &self.current
    }

    pub fn has_data(&self) -> bool {
        !self.current.is_empty()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Validate the request and move to `Querying`.
    pub fn start_query(
        &mut self,
        kind: ReportKind,
        group: &str,
        measure: &str,
    ) -> Option<PendingQuery> {
        if self.state == QueryState::Querying {
            self.notify(
                NoticeLevel::Warning,
                "Query in progress",
                ReportError::Busy.to_string(),
            );
            return None;
        }

        let group = group.trim();
        if group.is_empty() || !self.db.is_connected() {
            self.notify(
                NoticeLevel::Warning,
                "Warning",
                "Select or type a valid dependency and check the database connection.",
            );
            return None;
        }

        let report = self.report(kind);
        if !report.measures.iter().any(|m| m == measure) {
            let message = format!(
                "'{}' is not a measure of {}; choose one of: {}",
                measure,
                report.kind,
                report.measures.join(", ")
            );
            self.notify(NoticeLevel::Warning, "Warning", message);
            return None;
        }

        self.state = QueryState::Querying;
        Some(PendingQuery {
            kind,
            group: group.to_string(),
            measure: measure.to_string(),
        })
    }

    /// Execute, pivot and store the result, then return to `Idle`.
    pub fn complete_query(&mut self, pending: PendingQuery) -> QueryOutcome {
        let outcome = self.execute_pending(&pending);
        self.state = QueryState::Idle;
        outcome
    }

    /// `start_query` followed by `complete_query`.
    pub fn run_query(&mut self, kind: ReportKind, group: &str, measure: &str) -> QueryOutcome {
        match self.start_query(kind, group, measure) {
            Some(pending) => self.complete_query(pending),
            None => QueryOutcome::Rejected,
        }
    }

    fn execute_pending(&mut self, pending: &PendingQuery) -> QueryOutcome {
        let plan = self.query_plan(pending.kind);
        let spec = self.pivot_spec(pending.kind, &pending.measure);
        let group = pending.group.as_str();

        let raw = match self.db.connection() {
            Ok(conn) => query::try_execute(conn, &self.catalog, &plan, group)
                .map_err(ReportError::from),
            Err(e) => Err(e),
        };

        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                error!(group, error = %e, "query failed");
                self.current = PivotTable::default();
                self.notify(
                    NoticeLevel::Error,
                    "Query error",
                    format!("An error occurred while querying the database: {}", e),
                );
                return QueryOutcome::Failed;
            }
        };

        if raw.is_empty() {
            self.current = PivotTable::default();
            self.notify(
                NoticeLevel::Warning,
                "No results",
                format!("No records were found for '{}'.", group),
            );
            return QueryOutcome::Empty;
        }

        match pivot(&raw, &spec) {
            Ok(table) if table.is_empty() => {
                warn!(group, raw_rows = raw.len(), "pivot produced no rows");
                self.current = PivotTable::default();
                self.notify(
                    NoticeLevel::Warning,
                    "No results",
                    format!(
                        "{} records were found for '{}' but none had a complete key.",
                        raw.len(),
                        group
                    ),
                );
                QueryOutcome::Empty
            }
            Ok(table) => {
                let rows = table.len();
                let mut message =
                    format!("Found {} consolidated records for '{}'.", rows, group);
                if table.coerced_to_zero > 0 {
                    message.push_str(&format!(
                        " {} non-numeric amounts were counted as zero.",
                        table.coerced_to_zero
                    ));
                }
                info!(group, rows, "query successful");
                self.current = table;
                self.notify(NoticeLevel::Info, "Query successful", message);
                QueryOutcome::HasData(rows)
            }
            Err(e) => {
                error!(group, error = %e, "pivot failed");
                self.current = PivotTable::default();
                self.notify(
                    NoticeLevel::Error,
                    "Transformation failed",
                    format!("The records were retrieved but could not be pivoted: {}", e),
                );
                QueryOutcome::Failed
            }
        }
    }

    /// Export the current result. Returns true when a file was written.
    pub fn export(&mut self, path: &Path) -> bool {
        if !self.has_data() {
            self.notify(NoticeLevel::Warning, "Warning", "There is no data to export.");
            return false;
        }

        match export_table(&self.current.to_table(), path).map_err(ReportError::from) {
            Ok(_) => {
                self.notify(
                    NoticeLevel::Info,
                    "Export successful",
                    format!("Data exported to:\n{}", path.display()),
                );
                true
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "export failed");
                self.notify(
                    NoticeLevel::Error,
                    "Export error",
                    format!("An error occurred while saving the file:\n{}", e),
                );
                false
            }
        }
    }

    /// Close the connection. The session can be initialized again afterwards.
    pub fn shutdown(&mut self) {
        self.db.close();
    }

    fn query_plan(&self, kind: ReportKind) -> QueryPlan {
        let reference = &self.config.reference;
        QueryPlan {
            table: self.report(kind).table.clone(),
            issuer_column: self.config.columns.issuer.clone(),
            receiver_column: self.config.columns.receiver.clone(),
            join: Some(JoinSpec {
                table: reference.table.clone(),
                key_column: reference.key_column.clone(),
                name_column: reference.name_column.clone(),
                collation: reference.collation.clone(),
            }),
        }
    }

    fn pivot_spec(&self, kind: ReportKind, measure: &str) -> PivotSpec {
        let columns = &self.config.columns;
        PivotSpec {
            group_column: GROUP_COLUMN.to_string(),
            issuer_column: columns.issuer.clone(),
            receiver_column: columns.receiver.clone(),
            transaction_column: columns.transaction_id.clone(),
            display_name_column: DISPLAY_NAME_COLUMN.to_string(),
            category_column: self.report(kind).category_column.clone(),
            measure_column: measure.to_string(),
        }
    }

    fn notify(&mut self, level: NoticeLevel, title: &str, message: impl Into<String>) {
        self.notices.push_back(Notice::new(level, title, message));
    }
}
