//! Migration Ledger - the table recording applied migrations
//!
//! One row per applied migration name. Reads go straight to the pool; writes
//! always happen inside the transaction of the migration they describe, so a
//! migration's effects and its ledger row commit or roll back together.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info};

use super::definitions::LedgerRecord;
use crate::backends::{DatabasePool, DatabaseRow, DatabaseTransaction, DatabaseValue, SqlDialect};
use crate::error::{MigrationError, MigrationResult};

/// Length of the `name` column
pub const NAME_MAX_LENGTH: usize = 150;

/// Data access for the ledger table
pub struct Ledger<'a> {
    pool: &'a dyn DatabasePool,
    table: &'a str,
    chunk_size: usize,
}

impl<'a> Ledger<'a> {
    /// `table` must already be a validated identifier and `chunk_size` non-zero
    pub fn new(pool: &'a dyn DatabasePool, table: &'a str, chunk_size: usize) -> Self {
        Self {
            pool,
            table,
            chunk_size: chunk_size.max(1),
        }
    }

    fn dialect(&self) -> SqlDialect {
        self.pool.sql_dialect()
    }

    fn quoted_table(&self) -> String {
        self.dialect().quote_identifier(self.table)
    }

    fn unavailable(&self, err: MigrationError) -> MigrationError {
        MigrationError::LedgerUnavailable {
            table: self.table.to_string(),
            message: err.to_string(),
        }
    }

    /// Create the ledger table if it does not exist; returns whether it was just created
    pub async fn ensure_table(&self) -> MigrationResult<bool> {
        let exists = self
            .pool
            .fetch_optional(&self.dialect().table_exists_sql(), &[self.table.into()])
            .await
            .map_err(|e| self.unavailable(e))?
            .is_some();

        if exists {
            return Ok(false);
        }

        info!(table = self.table, "Init table: {}", self.table);
        self.pool
            .execute(&self.create_table_sql(), &[])
            .await
            .map_err(|e| self.unavailable(e))?;

        Ok(true)
    }

    /// Names among `candidates` that have a ledger row
    ///
    /// Candidates are looked up `chunk_size` at a time, so the number of bound
    /// parameters per query never exceeds the chunk size.
    pub async fn applied_names(&self, candidates: &[String]) -> MigrationResult<HashSet<String>> {
        Ok(self
            .applied_records(candidates)
            .await?
            .into_iter()
            .map(|record| record.name)
            .collect())
    }

    /// Ledger rows for the names among `candidates`, looked up chunk by chunk
    pub async fn applied_records(&self, candidates: &[String]) -> MigrationResult<Vec<LedgerRecord>> {
        let mut records = Vec::new();

        for chunk in candidates.chunks(self.chunk_size) {
            let sql = self.select_names_sql(chunk.len());
            let params: Vec<DatabaseValue> = chunk.iter().map(|name| name.as_str().into()).collect();

            debug!(table = self.table, chunk = chunk.len(), "Querying applied migrations");
            let rows = self
                .pool
                .fetch_all(&sql, &params)
                .await
                .map_err(|e| self.unavailable(e))?;

            for row in rows {
                records.push(decode_record(&row).map_err(|e| self.unavailable(e))?);
            }
        }

        Ok(records)
    }

    /// Insert the ledger row for `name` inside `tx`
    pub async fn record(&self, tx: &mut dyn DatabaseTransaction, name: &str) -> MigrationResult<()> {
        if name.chars().count() > NAME_MAX_LENGTH {
            return Err(MigrationError::Database(format!(
                "Migration name '{}' exceeds {} characters",
                name, NAME_MAX_LENGTH
            )));
        }

        let dialect = self.dialect();
        let sql = format!(
            "INSERT INTO {} (name, created_at, updated_at) VALUES ({}, {}, {})",
            self.quoted_table(),
            dialect.parameter_placeholder(0),
            dialect.current_timestamp(),
            dialect.current_timestamp()
        );

        tx.execute(&sql, &[name.into()]).await?;
        Ok(())
    }

    /// Delete the ledger row for `name` inside `tx`; returns whether a row existed
    pub async fn delete(&self, tx: &mut dyn DatabaseTransaction, name: &str) -> MigrationResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE name = {}",
            self.quoted_table(),
            self.dialect().parameter_placeholder(0)
        );

        let affected = tx.execute(&sql, &[name.into()]).await?;
        Ok(affected > 0)
    }

    /// SQL to create the ledger table
    pub fn create_table_sql(&self) -> String {
        let dialect = self.dialect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id {},\n    \
                name VARCHAR({}) NOT NULL UNIQUE,\n    \
                created_at TIMESTAMP NULL,\n    \
                updated_at TIMESTAMP NULL\n\
            )",
            self.quoted_table(),
            dialect.auto_increment_primary_key(),
            NAME_MAX_LENGTH
        )
    }

    /// SQL to select the ledger rows matching `count` bound names
    fn select_names_sql(&self, count: usize) -> String {
        format!(
            "SELECT id, name, created_at, updated_at FROM {} WHERE name IN ({})",
            self.quoted_table(),
            self.dialect().parameter_list(0, count)
        )
    }
}

fn decode_record(row: &DatabaseRow) -> MigrationResult<LedgerRecord> {
    let id = row
        .get_by_name("id")?
        .as_i64()
        .ok_or_else(|| MigrationError::Database("Ledger id is not an integer".to_string()))?;

    Ok(LedgerRecord {
        id,
        name: row.get_string("name")?,
        created_at: timestamp(row.get_by_name("created_at")?),
        updated_at: timestamp(row.get_by_name("updated_at")?),
    })
}

/// Timestamps come back typed from PostgreSQL and as text from SQLite
fn timestamp(value: &DatabaseValue) -> Option<DateTime<Utc>> {
    match value {
        DatabaseValue::DateTime(dt) => Some(*dt),
        DatabaseValue::String(text) => NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
            .map(|naive| naive.and_utc())
            .or_else(|_| DateTime::parse_from_rfc3339(text).map(|dt| dt.with_timezone(&Utc)))
            .ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SqlitePool;

    #[tokio::test]
    async fn ensure_table_reports_creation_once() {
        let pool = SqlitePool::memory().await.unwrap();
        let ledger = Ledger::new(&pool, "migrations", 20);

        assert!(ledger.ensure_table().await.unwrap());
        assert!(!ledger.ensure_table().await.unwrap());
    }

    #[tokio::test]
    async fn record_and_delete_within_transactions() {
        let pool = SqlitePool::memory().await.unwrap();
        let ledger = Ledger::new(&pool, "schema_ledger", 2);
        ledger.ensure_table().await.unwrap();

        let mut tx = pool.begin_transaction().await.unwrap();
        ledger.record(tx.as_mut(), "1_a").await.unwrap();
        ledger.record(tx.as_mut(), "2_b").await.unwrap();
        ledger.record(tx.as_mut(), "3_c").await.unwrap();
        tx.commit().await.unwrap();

        let candidates: Vec<String> = ["1_a", "2_b", "3_c", "4_d"].iter().map(|s| s.to_string()).collect();
        let applied = ledger.applied_names(&candidates).await.unwrap();
        assert_eq!(applied, HashSet::from(["1_a".to_string(), "2_b".to_string(), "3_c".to_string()]));

        let records = ledger.applied_records(&candidates[..1]).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].created_at.is_some());

        let mut tx = pool.begin_transaction().await.unwrap();
        assert!(ledger.delete(tx.as_mut(), "2_b").await.unwrap());
        assert!(!ledger.delete(tx.as_mut(), "9_z").await.unwrap());
        tx.rollback().await.unwrap();

        assert!(ledger.applied_names(&candidates).await.unwrap().contains("2_b"));
    }

    #[tokio::test]
    async fn names_are_unique() {
        let pool = SqlitePool::memory().await.unwrap();
        let ledger = Ledger::new(&pool, "migrations", 20);
        ledger.ensure_table().await.unwrap();

        let mut tx = pool.begin_transaction().await.unwrap();
        ledger.record(tx.as_mut(), "1_a").await.unwrap();
        assert!(ledger.record(tx.as_mut(), "1_a").await.is_err());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn empty_candidates_issue_no_query() {
        let pool = SqlitePool::memory().await.unwrap();
        // No table: any query would fail with LedgerUnavailable.
        let ledger = Ledger::new(&pool, "missing_table", 20);
        assert!(ledger.applied_names(&[]).await.unwrap().is_empty());

        let err = ledger.applied_names(&["1_a".to_string()]).await.unwrap_err();
        assert!(matches!(err, MigrationError::LedgerUnavailable { .. }));
    }

    #[tokio::test]
    async fn create_table_sql_uses_dialect() {
        let pool = SqlitePool::memory().await.unwrap();
        let sql = Ledger::new(&pool, "migrations", 20).create_table_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"migrations\""));
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("name VARCHAR(150) NOT NULL UNIQUE"));
    }

    #[test]
    fn parses_text_timestamps() {
        let parsed = timestamp(&DatabaseValue::from("2024-01-01 12:00:00")).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-01T12:00:00+00:00");
        assert!(timestamp(&DatabaseValue::from("2024-01-01T12:00:00Z")).is_some());
        assert!(timestamp(&DatabaseValue::Null).is_none());
    }
}
