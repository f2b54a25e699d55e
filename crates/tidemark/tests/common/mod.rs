//! Shared fixtures for the runner integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tidemark::backends::SqlitePool;
use tidemark::{
    DatabasePool, DatabaseRow, DatabaseTransaction, DatabaseValue, Migration, MigrationError, MigrationLogger,
    MigrationResult, SqlDialect, TransactionHandle,
};

/// Pool decorator counting what reaches the database outside of transactions
pub struct CountingPool {
    inner: SqlitePool,
    pool_statements: AtomicUsize,
    existence_queries: Mutex<Vec<usize>>,
}

impl CountingPool {
    pub async fn memory() -> Arc<Self> {
        let inner = SqlitePool::memory().await.expect("in-memory sqlite");
        Arc::new(Self {
            inner,
            pool_statements: AtomicUsize::new(0),
            existence_queries: Mutex::new(Vec::new()),
        })
    }

    /// Parameter count of every ledger existence query issued so far
    pub fn existence_queries(&self) -> Vec<usize> {
        self.existence_queries.lock().unwrap().clone()
    }

    /// Number of statements sent through the pool, transactions excluded
    pub fn pool_statements(&self) -> usize {
        self.pool_statements.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.pool_statements.store(0, Ordering::SeqCst);
        self.existence_queries.lock().unwrap().clear();
    }

    pub async fn table_exists(&self, table: &str) -> bool {
        self.inner
            .fetch_optional(&SqlDialect::SQLite.table_exists_sql(), &[table.into()])
            .await
            .unwrap()
            .is_some()
    }

    pub async fn ledger_names(&self, table: &str) -> Vec<String> {
        let sql = format!("SELECT name FROM \"{}\" ORDER BY name", table);
        self.inner
            .fetch_all(&sql, &[])
            .await
            .unwrap()
            .iter()
            .map(|row| row.get_string("name").unwrap())
            .collect()
    }

    fn count(&self, sql: &str, params: &[DatabaseValue]) {
        self.pool_statements.fetch_add(1, Ordering::SeqCst);
        if sql.contains("WHERE name IN (") {
            self.existence_queries.lock().unwrap().push(params.len());
        }
    }
}

#[async_trait]
impl DatabasePool for CountingPool {
    async fn begin_transaction(&self) -> MigrationResult<Box<dyn DatabaseTransaction>> {
        self.inner.begin_transaction().await
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<u64> {
        self.count(sql, params);
        self.inner.execute(sql, params).await
    }

    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<Vec<DatabaseRow>> {
        self.count(sql, params);
        self.inner.fetch_all(sql, params).await
    }

    async fn fetch_optional(&self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<Option<DatabaseRow>> {
        self.count(sql, params);
        self.inner.fetch_optional(sql, params).await
    }

    async fn close(&self) -> MigrationResult<()> {
        self.inner.close().await
    }

    fn sql_dialect(&self) -> SqlDialect {
        self.inner.sql_dialect()
    }
}

/// Shared record of `up:<label>` / `down:<label>` calls
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Migration that records its calls and optionally creates a table or fails
pub struct RecordingMigration {
    label: String,
    table: Option<String>,
    fail_up: bool,
    fail_down: bool,
    calls: CallLog,
}

impl RecordingMigration {
    pub fn new(label: &str, calls: &CallLog) -> Self {
        Self {
            label: label.to_string(),
            table: None,
            fail_up: false,
            fail_down: false,
            calls: Arc::clone(calls),
        }
    }

    /// Create `table` on up and drop it on down
    pub fn creating(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn failing_up(mut self) -> Self {
        self.fail_up = true;
        self
    }

    pub fn failing_down(mut self) -> Self {
        self.fail_down = true;
        self
    }
}

#[async_trait]
impl Migration for RecordingMigration {
    async fn up(&self, tx: &mut TransactionHandle<'_>, log: &dyn MigrationLogger) -> MigrationResult<()> {
        self.calls.lock().unwrap().push(format!("up:{}", self.label));
        if let Some(table) = &self.table {
            tx.execute(&format!("CREATE TABLE {} (id INTEGER PRIMARY KEY)", table)).await?;
            log.info(&format!("created {}", table));
        }
        if self.fail_up {
            return Err(MigrationError::Database(format!("{} refused to apply", self.label)));
        }
        Ok(())
    }

    async fn down(&self, tx: &mut TransactionHandle<'_>, _log: &dyn MigrationLogger) -> MigrationResult<()> {
        self.calls.lock().unwrap().push(format!("down:{}", self.label));
        if let Some(table) = &self.table {
            tx.execute(&format!("DROP TABLE {}", table)).await?;
        }
        if self.fail_down {
            return Err(MigrationError::Database(format!("{} refused to revert", self.label)));
        }
        Ok(())
    }
}

/// Logger keeping every message for later assertions
#[derive(Default)]
pub struct MemoryLogger {
    messages: Mutex<Vec<String>>,
}

impl MemoryLogger {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.messages.lock().unwrap().iter().any(|m| m == message)
    }
}

impl MigrationLogger for MemoryLogger {
    fn info(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("INFO {}", message));
    }

    fn error(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("ERROR {}", message));
    }
}
