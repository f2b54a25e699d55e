//! Migration configuration
//!
//! Defaults can be overridden from the environment:
//!
//! | Variable                    | Field              | Default      |
//! |-----------------------------|--------------------|--------------|
//! | `TIDEMARK_MIGRATIONS_DIR`   | `migrations_dir`   | `migrations` |
//! | `TIDEMARK_MIGRATIONS_TABLE` | `migrations_table` | `migrations` |
//! | `TIDEMARK_CHUNK_SIZE`       | `chunk_size`       | `20`         |

use std::env;
use std::path::PathBuf;

use crate::error::{MigrationError, MigrationResult};

pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
pub const DEFAULT_MIGRATIONS_TABLE: &str = "migrations";
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// Longest identifier accepted by every supported backend
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Configuration for the migration system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking applied migrations
    pub migrations_table: String,
    /// Maximum number of names bound into a single ledger lookup
    pub chunk_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl MigrationConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> MigrationResult<Self> {
        let mut config = Self::default();

        if let Ok(dir) = env::var("TIDEMARK_MIGRATIONS_DIR") {
            config.migrations_dir = PathBuf::from(dir);
        }

        if let Ok(table) = env::var("TIDEMARK_MIGRATIONS_TABLE") {
            config.migrations_table = table;
        }

        if let Ok(chunk_size) = env::var("TIDEMARK_CHUNK_SIZE") {
            config.chunk_size = chunk_size.trim().parse().map_err(|_| {
                MigrationError::Configuration(format!(
                    "TIDEMARK_CHUNK_SIZE must be a positive integer, got '{}'",
                    chunk_size
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = table.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Validate the configuration
    ///
    /// The ledger table name is interpolated into SQL, so it must be a plain identifier.
    pub fn validate(&self) -> MigrationResult<()> {
        validate_identifier(&self.migrations_table)?;

        if self.chunk_size == 0 {
            return Err(MigrationError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_identifier(identifier: &str) -> MigrationResult<()> {
    let mut chars = identifier.chars();
    let valid_start = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrationError::Configuration(format!(
            "Invalid migrations table name '{}': expected [A-Za-z_][A-Za-z0-9_]* of at most {} characters",
            identifier, MAX_IDENTIFIER_LENGTH
        )));
    }

    Ok(())
}
