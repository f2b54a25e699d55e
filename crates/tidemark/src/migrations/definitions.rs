//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the [`Migration`] contract implemented by migration authors and the
//! value types reported by the runner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::MigrationResult;
use crate::logger::MigrationLogger;
use crate::transaction::TransactionHandle;

/// A named, reversible unit of schema or data change
///
/// The name is not part of the trait: it is chosen when the migration is
/// registered, conventionally `<unix_timestamp>_<slug>`.
///
/// ```ignore
/// struct CreateUsers;
///
/// #[async_trait]
/// impl Migration for CreateUsers {
///     async fn up(&self, tx: &mut TransactionHandle<'_>, log: &dyn MigrationLogger) -> MigrationResult<()> {
///         tx.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL)").await?;
///         log.info("users table created");
///         Ok(())
///     }
///
///     async fn down(&self, tx: &mut TransactionHandle<'_>, _log: &dyn MigrationLogger) -> MigrationResult<()> {
///         tx.execute("DROP TABLE users").await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Migration: Send + Sync {
    /// Apply the change inside the runner-managed transaction
    async fn up(&self, tx: &mut TransactionHandle<'_>, log: &dyn MigrationLogger) -> MigrationResult<()>;

    /// Revert the change inside the runner-managed transaction
    async fn down(&self, tx: &mut TransactionHandle<'_>, log: &dyn MigrationLogger) -> MigrationResult<()>;
}

/// A row of the ledger table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRecord {
    pub id: i64,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Result of running migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationRunResult {
    /// Names of the migrations applied by this run, in order
    pub applied_migrations: Vec<String>,
    /// Number of registered migrations that were already applied
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// Apply the migration
    Up,
    /// Revert the migration
    Down,
}

impl std::fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "up"),
            MigrationDirection::Down => write!(f, "down"),
        }
    }
}

/// Whether a registered migration has been applied to the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    Pending,
    Applied,
}

/// Status line for a registered migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub name: String,
    pub state: MigrationState,
    /// When the ledger row was written, for applied migrations
    pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.state == MigrationState::Applied
    }
}
