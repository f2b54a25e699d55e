//! Transaction handle given to migration bodies
//!
//! The runner owns every transaction it opens. Migration bodies only get a
//! [`TransactionHandle`], which can run statements inside that transaction but
//! has no way to commit or roll it back.

use crate::backends::{DatabaseRow, DatabaseTransaction, DatabaseValue, SqlDialect};
use crate::error::MigrationResult;

/// Statement execution capability scoped to a runner-managed transaction
pub struct TransactionHandle<'t> {
    tx: &'t mut dyn DatabaseTransaction,
    dialect: SqlDialect,
}

impl<'t> TransactionHandle<'t> {
    pub(crate) fn new(tx: &'t mut dyn DatabaseTransaction, dialect: SqlDialect) -> Self {
        Self { tx, dialect }
    }

    /// SQL dialect of the underlying database
    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Execute a statement without parameters
    pub async fn execute(&mut self, sql: &str) -> MigrationResult<u64> {
        self.tx.execute(sql, &[]).await
    }

    /// Execute a statement with bound parameters
    pub async fn execute_with(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<u64> {
        self.tx.execute(sql, params).await
    }

    /// Run a query and return every row
    pub async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<Vec<DatabaseRow>> {
        self.tx.fetch_all(sql, params).await
    }

    /// Run a query and return the first row, if any
    pub async fn fetch_optional(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<Option<DatabaseRow>> {
        self.tx.fetch_optional(sql, params).await
    }
}
