//! Database-specific call syntax and identifier conventions.

mod mysql;
mod postgres;

pub use mysql::MySqlDialect;
pub use postgres::PostgreSqlDialect;

use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::core::{DbError, Result};

/// Strategy for building stored-procedure invocations and mapping names.
///
/// Implementations are stateless and shared across sessions.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Builds the statement invoking `name` with `param_count` positional `?` placeholders.
    fn build_stored_procedure_query(&self, name: &str, param_count: usize) -> String;

    /// Database convention -> code convention, e.g. `last_name` -> `lastName`.
    fn from_database_name(&self, name: &str) -> String;

    /// Code convention -> database convention, e.g. `lastName` -> `last_name`.
    fn to_database_name(&self, name: &str) -> String;
}

pub(crate) fn placeholders(param_count: usize) -> String {
    vec!["?"; param_count].join(",")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    #[serde(alias = "postgres", alias = "pg")]
    PostgreSql,
    MySql,
}

impl DialectKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Self::PostgreSql),
            "mysql" => Ok(Self::MySql),
            other => Err(DbError::ConfigError(format!(
                "Unknown dialect '{}', expected one of: postgresql, mysql",
                other
            ))),
        }
    }

    pub fn create(&self) -> Arc<dyn Dialect> {
        match self {
            Self::PostgreSql => Arc::new(PostgreSqlDialect),
            Self::MySql => Arc::new(MySqlDialect),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PostgreSql => write!(f, "postgresql"),
            Self::MySql => write!(f, "mysql"),
        }
    }
}
