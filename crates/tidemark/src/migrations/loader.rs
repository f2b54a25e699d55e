//! SQL file migrations
//!
//! Loads `<timestamp>_<slug>.sql` files from the migrations directory. Each
//! file holds an up section and a down section introduced by comment markers:
//!
//! ```sql
//! -- Up migration
//! CREATE TABLE users (id SERIAL PRIMARY KEY, email VARCHAR(255) NOT NULL);
//!
//! -- Down migration
//! DROP TABLE users;
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::{debug, warn};

use super::definitions::{Migration, MigrationDirection};
use crate::error::{MigrationError, MigrationResult};
use crate::logger::MigrationLogger;
use crate::transaction::TransactionHandle;

/// A migration defined by raw SQL for each direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    up_sql: String,
    down_sql: String,
}

impl SqlMigration {
    pub fn new(up_sql: impl Into<String>, down_sql: impl Into<String>) -> Self {
        Self {
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
        }
    }

    pub fn up_sql(&self) -> &str {
        &self.up_sql
    }

    pub fn down_sql(&self) -> &str {
        &self.down_sql
    }

    async fn run(&self, direction: MigrationDirection, tx: &mut TransactionHandle<'_>) -> MigrationResult<()> {
        let sql = match direction {
            MigrationDirection::Up => &self.up_sql,
            MigrationDirection::Down => &self.down_sql,
        };

        for statement in split_sql_statements(sql) {
            tx.execute(&statement).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Migration for SqlMigration {
    async fn up(&self, tx: &mut TransactionHandle<'_>, _log: &dyn MigrationLogger) -> MigrationResult<()> {
        self.run(MigrationDirection::Up, tx).await
    }

    async fn down(&self, tx: &mut TransactionHandle<'_>, _log: &dyn MigrationLogger) -> MigrationResult<()> {
        self.run(MigrationDirection::Down, tx).await
    }
}

/// Reads SQL migrations from a directory
pub struct MigrationLoader {
    dir: PathBuf,
}

impl MigrationLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load all `*.sql` files, sorted by name; a missing directory holds no migrations
    pub fn load_sql_migrations(&self) -> MigrationResult<Vec<(String, SqlMigration)>> {
        if !self.dir.exists() {
            debug!(dir = %self.dir.display(), "Migrations directory does not exist");
            return Ok(Vec::new());
        }

        let mut migrations = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "sql") {
                migrations.push(self.parse_migration_file(&path)?);
            }
        }

        migrations.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(migrations)
    }

    /// Parse a migration file into its name and SQL
    fn parse_migration_file(&self, path: &Path) -> MigrationResult<(String, SqlMigration)> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| invalid(path, "file name is not valid UTF-8"))?;

        if !name.contains('_') {
            return Err(invalid(path, "file name must follow the format <timestamp>_<name>.sql"));
        }

        let content = fs::read_to_string(path)?;
        let migration = parse_migration_content(&content).ok_or_else(|| invalid(path, "missing '-- Up' section marker"))?;

        Ok((name.to_string(), migration))
    }
}

fn invalid(path: &Path, message: &str) -> MigrationError {
    MigrationError::InvalidMigrationFile {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Up,
    Down,
}

/// Split file content into up and down SQL; `None` when there is no up marker
fn parse_migration_content(content: &str) -> Option<SqlMigration> {
    let mut up_sql = Vec::new();
    let mut down_sql = Vec::new();
    let mut section = Section::Preamble;
    let mut saw_up = false;

    for line in content.lines() {
        if let Some(marker) = section_marker(line) {
            saw_up |= marker == Section::Up;
            section = marker;
            continue;
        }

        match section {
            Section::Up => up_sql.push(line),
            Section::Down => down_sql.push(line),
            Section::Preamble => {}
        }
    }

    saw_up.then(|| SqlMigration::new(up_sql.join("\n").trim(), down_sql.join("\n").trim()))
}

/// `-- Up`, `-- up migration`, `-- Down:` and friends
fn section_marker(line: &str) -> Option<Section> {
    let comment = line.trim().strip_prefix("--")?;
    let word = comment.split_whitespace().next()?.trim_end_matches(':').to_lowercase();

    match word.as_str() {
        "up" => Some(Section::Up),
        "down" => Some(Section::Down),
        _ => None,
    }
}

/// Split SQL text into individual statements
///
/// Statement boundaries come from the sqlparser tokenizer, so semicolons inside
/// string literals, quoted identifiers, comments and dollar-quoted bodies do not
/// split. The original statement text is kept verbatim. Segments holding only
/// whitespace or comments are dropped.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let dialect = GenericDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize_with_location() {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!("SQL tokenizing failed, using naive semicolon splitting: {}", e);
            return sql
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    };

    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let offset_of = |line: u64, column: u64| -> usize {
        let line_start = line_starts
            .get((line as usize).saturating_sub(1))
            .copied()
            .unwrap_or(sql.len());
        sql[line_start..]
            .char_indices()
            .nth((column as usize).saturating_sub(1))
            .map_or(sql.len(), |(i, _)| line_start + i)
    };

    let mut statements = Vec::new();
    let mut start = 0;
    let mut has_content = false;

    for token in tokens {
        match token.token {
            Token::SemiColon => {
                let end = offset_of(token.location.line, token.location.column);
                if has_content {
                    statements.push(sql[start..end].trim().to_string());
                }
                start = end + 1;
                has_content = false;
            }
            Token::Whitespace(_) | Token::EOF => {}
            _ => has_content = true,
        }
    }

    if has_content {
        statements.push(sql[start..].trim().to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn splits_simple_statements() {
        let statements = split_sql_statements(
            "CREATE TABLE a (id INTEGER);\nCREATE TABLE b (id INTEGER);\n\nINSERT INTO a VALUES (1)",
        );
        assert_eq!(
            statements,
            vec![
                "CREATE TABLE a (id INTEGER)",
                "CREATE TABLE b (id INTEGER)",
                "INSERT INTO a VALUES (1)",
            ]
        );
    }

    #[test]
    fn keeps_semicolons_inside_literals() {
        let statements = split_sql_statements(
            "INSERT INTO notes (body) VALUES ('first; still first');\n-- comment; not a boundary\nINSERT INTO notes (body) VALUES ('it''s')",
        );
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "INSERT INTO notes (body) VALUES ('first; still first')");
        assert!(statements[1].ends_with("VALUES ('it''s')"));
    }

    #[test]
    fn drops_empty_and_comment_only_segments() {
        assert!(split_sql_statements("").is_empty());
        assert!(split_sql_statements(" ;; \n-- nothing here\n").is_empty());
        assert_eq!(split_sql_statements("SELECT 1;\n-- trailing"), vec!["SELECT 1"]);
    }

    #[test]
    fn handles_multibyte_text_before_boundaries() {
        let statements = split_sql_statements("INSERT INTO t VALUES ('héllo wörld'); SELECT 2");
        assert_eq!(statements, vec!["INSERT INTO t VALUES ('héllo wörld')", "SELECT 2"]);
    }

    #[test]
    fn parses_sections() {
        let content = "-- Migration: create users\n-- Up migration\nCREATE TABLE users (id INTEGER);\n\n-- Down migration\nDROP TABLE users;\n";
        let migration = parse_migration_content(content).unwrap();
        assert_eq!(migration.up_sql(), "CREATE TABLE users (id INTEGER);");
        assert_eq!(migration.down_sql(), "DROP TABLE users;");
    }

    #[test]
    fn update_comment_is_not_a_marker() {
        let content = "-- up\n-- update existing rows\nUPDATE users SET active = 1;\n-- down:\n";
        let migration = parse_migration_content(content).unwrap();
        assert!(migration.up_sql().contains("UPDATE users"));
        assert_eq!(migration.down_sql(), "");
        assert!(parse_migration_content("CREATE TABLE x (id INTEGER);").is_none());
    }

    #[test]
    fn loads_sorted_sql_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("1700000200_add_posts.sql"),
            "-- Up\nCREATE TABLE posts (id INTEGER);\n-- Down\nDROP TABLE posts;",
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("1700000100_add_users.sql"),
            "-- Up\nCREATE TABLE users (id INTEGER);\n-- Down\nDROP TABLE users;",
        )
        .unwrap();
        fs::write(temp_dir.path().join("README.md"), "not a migration").unwrap();

        let migrations = MigrationLoader::new(temp_dir.path()).load_sql_migrations().unwrap();
        let names: Vec<_> = migrations.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["1700000100_add_users", "1700000200_add_posts"]);
        assert_eq!(migrations[1].1.down_sql(), "DROP TABLE posts;");
    }

    #[test]
    fn missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let loader = MigrationLoader::new(temp_dir.path().join("nope"));
        assert!(loader.load_sql_migrations().unwrap().is_empty());
    }

    #[test]
    fn rejects_badly_named_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("users.sql"), "-- Up\nSELECT 1;").unwrap();

        let err = MigrationLoader::new(temp_dir.path()).load_sql_migrations().unwrap_err();
        assert!(matches!(err, MigrationError::InvalidMigrationFile { .. }));
    }
}
