// Error taxonomy for the report pipeline
//
// Configuration errors are fatal at startup. Everything else is caught by the
// session, logged, and shown to the user as a notice.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::db::ConnectionError;
use crate::export::ExportError;
use crate::pivot::PivotError;
use crate::query::QueryError;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Transform(#[from] PivotError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("not connected to the database")]
    NotConnected,

    #[error("a query is already running")]
    Busy,
}

impl From<::config::ConfigError> for ReportError {
    fn from(err: ::config::ConfigError) -> Self {
        ReportError::Config(err.to_string())
    }
}

pub type Result<T, E = ReportError> = std::result::Result<T, E>;
