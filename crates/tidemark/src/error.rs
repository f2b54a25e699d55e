//! Error types for the migration system
//!
//! Every fallible operation in the crate returns [`MigrationResult`]. Migration
//! bodies return the same type, so their failures can be wrapped into
//! [`MigrationError::MigrationFailure`] with the offending migration name attached.

use std::path::PathBuf;

use thiserror::Error;

use crate::migrations::definitions::MigrationDirection;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A requested name has no registered implementation
    #[error("Does not exist migration with name: {name}")]
    UnknownMigration { name: String },

    /// Two migrations were registered under the same name
    #[error("Migration '{name}' is registered more than once")]
    DuplicateRegistration { name: String },

    /// The ledger table cannot be created or queried
    #[error("Migration ledger '{table}' is unavailable: {message}")]
    LedgerUnavailable { table: String, message: String },

    /// The body of a migration returned an error
    #[error("{name} migration failed ({direction}): {source}")]
    MigrationFailure {
        name: String,
        direction: MigrationDirection,
        #[source]
        source: Box<MigrationError>,
    },

    /// A migration file for the requested name already exists
    #[error("File {name} already exists in dir: {}", .dir.display())]
    ScaffoldConflict { name: String, dir: PathBuf },

    /// A migration file could not be parsed
    #[error("Invalid migration file {}: {message}", .path.display())]
    InvalidMigrationFile { path: PathBuf, message: String },

    /// Statement execution or row decoding error
    #[error("Database error: {0}")]
    Database(String),

    /// Connection pool error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Begin, commit or rollback failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    /// Wrap a migration body error with the migration name and direction
    pub fn failure(name: &str, direction: MigrationDirection, source: MigrationError) -> Self {
        MigrationError::MigrationFailure {
            name: name.to_string(),
            direction,
            source: Box::new(source),
        }
    }

    /// Name of the migration this error is attributed to, if any
    pub fn migration_name(&self) -> Option<&str> {
        match self {
            MigrationError::UnknownMigration { name }
            | MigrationError::DuplicateRegistration { name }
            | MigrationError::MigrationFailure { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::Database(err.to_string())
    }
}

impl From<tera::Error> for MigrationError {
    fn from(err: tera::Error) -> Self {
        MigrationError::Template(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_carries_name_and_direction() {
        let err = MigrationError::failure(
            "1542299549_first",
            MigrationDirection::Up,
            MigrationError::Database("relation \"users\" already exists".to_string()),
        );

        assert_eq!(err.migration_name(), Some("1542299549_first"));
        let message = err.to_string();
        assert!(message.starts_with("1542299549_first migration failed (up)"));
        assert!(message.contains("already exists"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn unknown_migration_message() {
        let err = MigrationError::UnknownMigration {
            name: "nonexistent".to_string(),
        };
        assert_eq!(err.to_string(), "Does not exist migration with name: nonexistent");
        assert_eq!(err.migration_name(), Some("nonexistent"));
    }

    #[test]
    fn scaffold_conflict_mentions_directory() {
        let err = MigrationError::ScaffoldConflict {
            name: "create_users.rs".to_string(),
            dir: PathBuf::from("migrations"),
        };
        assert_eq!(
            err.to_string(),
            "File create_users.rs already exists in dir: migrations"
        );
        assert!(err.migration_name().is_none());
    }
}
