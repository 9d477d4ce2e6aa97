//! Application configuration.
//!
//! Read from an INI file (`config.ini` by default) with environment overrides
//! of the form `NOMINA_REPORT__SQL_SERVER__PASSWORD`. Section and key names
//! are accepted in either upper or lower case.
//!
//! ```ini
//! [SQL_SERVER]
//! DRIVER = sqlite
//! SERVER = .
//! DATABASE = nomina.db
//! USERNAME = reader
//! PASSWORD = secret
//! ENCRYPT = yes
//! TRUST_SERVER_CERTIFICATE = yes
//!
//! [PATHS]
//! CATALOGO_EXCEL_PATH = catalogo.xlsx
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{ReportError, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.ini";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "NOMINA_REPORT";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "NOMINA_REPORT_LOG";

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(alias = "SQL_SERVER")]
    pub sql_server: DbSettings,
    #[serde(alias = "PATHS")]
    pub paths: PathSettings,
    #[serde(default, alias = "TABLES")]
    pub tables: TableSettings,
    #[serde(default, alias = "REFERENCE")]
    pub reference: ReferenceSettings,
    #[serde(default, alias = "COLUMNS")]
    pub columns: ColumnSettings,
}

/// Database connection settings. Every key is required.
#[derive(Debug, Clone, Deserialize)]
pub struct DbSettings {
    #[serde(alias = "DRIVER")]
    pub driver: String,
    #[serde(alias = "SERVER")]
    pub server: String,
    #[serde(alias = "DATABASE")]
    pub database: String,
    #[serde(alias = "USERNAME")]
    pub username: String,
    #[serde(alias = "PASSWORD")]
    pub password: String,
    #[serde(alias = "ENCRYPT")]
    pub encrypt: String,
    #[serde(alias = "TRUST_SERVER_CERTIFICATE")]
    pub trust_server_certificate: String,
}

impl DbSettings {
    /// Connection string for logs, with the password redacted.
    pub fn redacted_connection_string(&self) -> String {
        format!(
            "DRIVER={{{}}};SERVER={};DATABASE={};UID={};PWD=****;Encrypt={};TrustServerCertificate={};",
            self.driver,
            self.server,
            self.database,
            self.username,
            self.encrypt,
            self.trust_server_certificate
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathSettings {
    #[serde(rename = "catalogo_excel_path", alias = "CATALOGO_EXCEL_PATH")]
    pub catalog_path: PathBuf,
}

/// Target table per report category.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    #[serde(alias = "PERCEPCIONES")]
    pub percepciones: String,
    #[serde(alias = "DEDUCCIONES")]
    pub deducciones: String,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            percepciones: "2024-AECF_0101_Anexo4-Detalle-Percepciones".to_string(),
            deducciones: "2024-AECF_0101_Anexo5-Detalle-Deducciones".to_string(),
        }
    }
}

/// Secondary table used to resolve the receiver's display name.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferenceSettings {
    #[serde(alias = "TABLE")]
    pub table: String,
    #[serde(alias = "KEY_COLUMN")]
    pub key_column: String,
    #[serde(alias = "NAME_COLUMN")]
    pub name_column: String,
    #[serde(alias = "COLLATION")]
    pub collation: String,
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        Self {
            table: "Padron".to_string(),
            key_column: "RFC".to_string(),
            name_column: "NOMBRE".to_string(),
            collation: "NOCASE".to_string(),
        }
    }
}

/// Source column names shared by both report tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColumnSettings {
    #[serde(alias = "ISSUER")]
    pub issuer: String,
    #[serde(alias = "RECEIVER")]
    pub receiver: String,
    #[serde(alias = "TRANSACTION_ID")]
    pub transaction_id: String,
}

impl Default for ColumnSettings {
    fn default() -> Self {
        Self {
            issuer: "EmisorRFC".to_string(),
            receiver: "ReceptorRFC".to_string(),
            transaction_id: "UUID".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path` (or `config.ini`) and the environment.
    ///
    /// A missing file or a missing required key is a fatal configuration error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        use ::config::{Config, Environment, File, FileFormat};

        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let file = File::from(path).format(FileFormat::Ini).required(true);

        let config = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX).separator("__"))
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from INI text. Used by tests and embedded setups.
    pub fn from_ini_str(text: &str) -> Result<Self> {
        use ::config::{Config, File, FileFormat};

        let config: AppConfig = Config::builder()
            .add_source(File::from_str(text, FileFormat::Ini))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let db = &self.sql_server;
        let required = [
            ("SQL_SERVER.DRIVER", db.driver.as_str()),
            ("SQL_SERVER.SERVER", db.server.as_str()),
            ("SQL_SERVER.DATABASE", db.database.as_str()),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ReportError::Config(format!("key {} is empty", key)));
            }
        }
        if self.paths.catalog_path.as_os_str().is_empty() {
            return Err(ReportError::Config(
                "key PATHS.CATALOGO_EXCEL_PATH is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "
[SQL_SERVER]
DRIVER = sqlite
SERVER = .
DATABASE = nomina.db
USERNAME = reader
PASSWORD = secret
ENCRYPT = yes
TRUST_SERVER_CERTIFICATE = yes

[PATHS]
CATALOGO_EXCEL_PATH = catalogo.xlsx
";

    #[test]
    fn test_full_config_with_defaults() {
        let config = AppConfig::from_ini_str(FULL).unwrap();

        assert_eq!(config.sql_server.driver, "sqlite");
        assert_eq!(config.sql_server.database, "nomina.db");
        assert_eq!(config.paths.catalog_path, PathBuf::from("catalogo.xlsx"));
        assert_eq!(config.columns.issuer, "EmisorRFC");
        assert_eq!(config.reference.collation, "NOCASE");
        assert!(config.tables.percepciones.contains("Percepciones"));
    }

    #[test]
    fn test_missing_required_key_is_fatal() {
        let without_password = FULL.replace("PASSWORD = secret\n", "");

        let err = AppConfig::from_ini_str(&without_password).unwrap_err();

        assert!(matches!(err, ReportError::Config(_)));
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_missing_paths_section_is_fatal() {
        let without_paths = FULL.replace("[PATHS]\nCATALOGO_EXCEL_PATH = catalogo.xlsx\n", "");

        assert!(matches!(
            AppConfig::from_ini_str(&without_paths),
            Err(ReportError::Config(_))
        ));
    }

    #[test]
    fn test_optional_sections_override_defaults() {
        let text = format!(
            "{}\n[REFERENCE]\nTABLE = Personas\nCOLLATION = BINARY\n\n[TABLES]\nDEDUCCIONES = Deducciones2025\n",
            FULL
        );

        let config = AppConfig::from_ini_str(&text).unwrap();

        assert_eq!(config.reference.table, "Personas");
        assert_eq!(config.reference.collation, "BINARY");
        assert_eq!(config.reference.name_column, "NOMBRE");
        assert_eq!(config.tables.deducciones, "Deducciones2025");
    }

    #[test]
    fn test_connection_string_redacts_password() {
        let config = AppConfig::from_ini_str(FULL).unwrap();
        let conn_str = config.sql_server.redacted_connection_string();

        assert!(conn_str.contains("DRIVER={sqlite}"));
        assert!(conn_str.contains("PWD=****"));
        assert!(!conn_str.contains("secret"));
    }
}
