//! Core Database Backend Traits
//!
//! The runner only talks to the database through these traits: a pool that
//! can begin transactions and run standalone statements, and a transaction
//! that can run statements until it is committed or rolled back.

use async_trait::async_trait;

use crate::error::{MigrationError, MigrationResult};

/// Abstract database transaction trait
#[async_trait]
pub trait DatabaseTransaction: Send {
    /// Execute a statement within the transaction and return the affected rows count
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<u64>;

    /// Execute a query within the transaction and return all result rows
    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<Vec<DatabaseRow>>;

    /// Execute a query within the transaction and return the first result row
    async fn fetch_optional(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<Option<DatabaseRow>>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> MigrationResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> MigrationResult<()>;
}

/// Abstract database connection pool trait
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Begin a transaction from the pool
    async fn begin_transaction(&self) -> MigrationResult<Box<dyn DatabaseTransaction>>;

    /// Execute a statement directly on the pool
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<u64>;

    /// Execute a query directly on the pool and return all result rows
    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<Vec<DatabaseRow>>;

    /// Execute a query directly on the pool and return the first result row
    async fn fetch_optional(&self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<Option<DatabaseRow>>;

    /// Close the pool
    async fn close(&self) -> MigrationResult<()>;

    /// SQL dialect spoken by this pool
    fn sql_dialect(&self) -> SqlDialect;
}

/// A fully decoded result row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseRow {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl DatabaseRow {
    pub fn new(columns: Vec<String>, values: Vec<DatabaseValue>) -> Self {
        Self { columns, values }
    }

    /// Get a column value by index
    pub fn get_by_index(&self, index: usize) -> MigrationResult<&DatabaseValue> {
        self.values
            .get(index)
            .ok_or_else(|| MigrationError::Database(format!("Column index {} out of range", index)))
    }

    /// Get a column value by name
    pub fn get_by_name(&self, name: &str) -> MigrationResult<&DatabaseValue> {
        let index = self
            .columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| MigrationError::Database(format!("Column '{}' not found", name)))?;

        self.get_by_index(index)
    }

    /// Get a non-null text column by name
    pub fn get_string(&self, name: &str) -> MigrationResult<String> {
        match self.get_by_name(name)? {
            DatabaseValue::String(value) => Ok(value.clone()),
            other => Err(MigrationError::Database(format!(
                "Column '{}' is not a string: {:?}",
                name, other
            ))),
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    DateTime(chrono::DateTime<chrono::Utc>),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(value) => Some(i64::from(*value)),
            DatabaseValue::Int64(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DatabaseValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder for the zero-based parameter `index`
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Comma separated placeholders for `count` parameters starting at `offset`
    pub fn parameter_list(&self, offset: usize, count: usize) -> String {
        (offset..offset + count)
            .map(|index| self.parameter_placeholder(index))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Get the quote character for identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        '"'
    }

    /// Quote an identifier that has already been validated
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let quote = self.identifier_quote();
        format!("{}{}{}", quote, identifier, quote)
    }

    /// Get the current timestamp function for this dialect
    pub fn current_timestamp(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "NOW()",
            SqlDialect::SQLite => "datetime('now')",
        }
    }

    /// Column definition for an auto-assigned integer primary key
    pub fn auto_increment_primary_key(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "SERIAL PRIMARY KEY",
            SqlDialect::SQLite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    /// Query returning one row when the table bound as the first parameter exists
    pub fn table_exists_sql(&self) -> String {
        match self {
            SqlDialect::PostgreSQL => format!(
                "SELECT 1 FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = {}",
                self.parameter_placeholder(0)
            ),
            SqlDialect::SQLite => format!(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = {}",
                self.parameter_placeholder(0)
            ),
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlDialect::PostgreSQL => write!(f, "postgresql"),
            SqlDialect::SQLite => write!(f, "sqlite"),
        }
    }
}

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: Option<u64>,
    pub max_lifetime_seconds: Option<u64>,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(600),
            max_lifetime_seconds: Some(1800),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_follow_dialect() {
        assert_eq!(SqlDialect::PostgreSQL.parameter_list(0, 3), "$1, $2, $3");
        assert_eq!(SqlDialect::PostgreSQL.parameter_list(2, 2), "$3, $4");
        assert_eq!(SqlDialect::SQLite.parameter_list(0, 3), "?, ?, ?");
        assert_eq!(SqlDialect::SQLite.parameter_list(0, 0), "");
    }

    #[test]
    fn row_lookup_by_name() {
        let row = DatabaseRow::new(
            vec!["id".to_string(), "name".to_string()],
            vec![DatabaseValue::Int64(7), DatabaseValue::from("1542299549_first")],
        );

        assert_eq!(row.column_count(), 2);
        assert_eq!(row.get_string("name").unwrap(), "1542299549_first");
        assert_eq!(row.get_by_name("id").unwrap().as_i64(), Some(7));
        assert!(row.get_string("id").is_err());
        assert!(row.get_by_name("missing").is_err());
        assert!(row.get_by_index(5).is_err());
    }

    #[test]
    fn optional_values_become_null() {
        let value: DatabaseValue = Option::<String>::None.into();
        assert!(value.is_null());
        let value: DatabaseValue = Some("x").into();
        assert_eq!(value.as_str(), Some("x"));
    }
}
