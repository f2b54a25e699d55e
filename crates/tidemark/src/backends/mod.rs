//! Database Backend Abstractions
//!
//! The migration runner is written against the traits in [`core`]; PostgreSQL
//! and SQLite implementations are provided on top of sqlx.

pub mod core;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

pub use self::core::*;
pub use self::postgres::PostgresPool;
pub use self::sqlite::SqlitePool;

use crate::error::{MigrationError, MigrationResult};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    SQLite,
}

impl DatabaseBackendType {
    /// Detect database backend type from URL
    pub fn from_url(database_url: &str) -> MigrationResult<Self> {
        let parsed = url::Url::parse(database_url)
            .map_err(|e| MigrationError::Configuration(format!("Invalid database URL: {}", e)))?;

        parsed.scheme().parse()
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::SQLite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseBackendType::PostgreSQL),
            "sqlite" => Ok(DatabaseBackendType::SQLite),
            _ => Err(MigrationError::Configuration(format!(
                "Unsupported database backend: {}",
                s
            ))),
        }
    }
}

/// Strip the password from a database URL so it can be logged
pub fn redact_database_url(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                // Only fails for cannot-be-a-base URLs, which carry no password anyway.
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}

/// Create a connection pool using the backend matching the URL scheme
pub async fn connect(database_url: &str, config: &DatabasePoolConfig) -> MigrationResult<Arc<dyn DatabasePool>> {
    let backend = DatabaseBackendType::from_url(database_url)?;
    info!(backend = %backend, url = %redact_database_url(database_url), "Connecting to database");

    let pool: Arc<dyn DatabasePool> = match backend {
        DatabaseBackendType::PostgreSQL => Arc::new(PostgresPool::connect(database_url, config).await?),
        DatabaseBackendType::SQLite => Arc::new(SqlitePool::connect(database_url, config).await?),
    };

    Ok(pool)
}
