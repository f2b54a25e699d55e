use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tidemark::backends::{self, redact_database_url};
use tidemark::{
    DatabasePool, DatabasePoolConfig, MigrationConfig, MigrationKind, MigrationRegistry, MigrationRunner,
    MigrationScaffolder, MigrationStatus,
};
use tracing::info;

/// Settings shared by every migrate command
pub struct MigrateOptions {
    database_url: Option<String>,
    config: MigrationConfig,
}

impl MigrateOptions {
    pub fn new(database_url: Option<String>, dir: PathBuf, table: String, chunk_size: usize) -> Result<Self> {
        let config = MigrationConfig::default()
            .with_migrations_dir(dir)
            .with_table(table)
            .with_chunk_size(chunk_size);
        config.validate().context("Invalid migration settings")?;

        Ok(Self { database_url, config })
    }

    async fn connect(&self) -> Result<Arc<dyn DatabasePool>> {
        let url = self
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow!("No database URL given; pass --database-url or set DATABASE_URL"))?;

        backends::connect(url, &DatabasePoolConfig::default())
            .await
            .with_context(|| format!("Failed to connect to {}", redact_database_url(url)))
    }

    async fn runner(&self) -> Result<MigrationRunner> {
        let registry = MigrationRegistry::from_directory(&self.config.migrations_dir).with_context(|| {
            format!(
                "Failed to load migrations from {}",
                self.config.migrations_dir.display()
            )
        })?;
        info!(count = registry.len(), dir = %self.config.migrations_dir.display(), "Loaded migrations");

        let pool = self.connect().await?;
        Ok(MigrationRunner::new(pool, registry).with_config(self.config.clone()))
    }
}

pub async fn up(options: &MigrateOptions) -> Result<()> {
    let runner = options.runner().await?;
    let result = runner.up_all().await.context("Migration run failed")?;

    if result.applied_migrations.is_empty() {
        println!("Nothing to migrate ({} already applied)", result.skipped_count);
    } else {
        for name in &result.applied_migrations {
            println!("Applied {}", name);
        }
        println!(
            "Applied {} migration(s) in {}ms",
            result.applied_count(),
            result.execution_time_ms
        );
    }

    runner.pool().close().await?;
    Ok(())
}

pub async fn up_one(options: &MigrateOptions, name: &str) -> Result<()> {
    let runner = options.runner().await?;
    runner
        .up_one(name)
        .await
        .with_context(|| format!("Failed to apply {}", name))?;

    println!("Applied {}", name);
    runner.pool().close().await?;
    Ok(())
}

pub async fn down(options: &MigrateOptions, name: &str) -> Result<()> {
    let runner = options.runner().await?;
    runner
        .down_one(name)
        .await
        .with_context(|| format!("Failed to revert {}", name))?;

    println!("Reverted {}", name);
    runner.pool().close().await?;
    Ok(())
}

pub async fn status(options: &MigrateOptions, json: bool) -> Result<()> {
    let runner = options.runner().await?;
    let statuses = runner.status().await.context("Failed to read migration status")?;
    runner.pool().close().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        print!("{}", render_status(&statuses));
    }
    Ok(())
}

pub fn make(options: &MigrateOptions, name: &str, kind: MigrationKind) -> Result<()> {
    let filename = MigrationScaffolder::new(&options.config.migrations_dir)
        .create(name, kind)
        .with_context(|| format!("Failed to create migration {}", name))?;

    println!("Created migration: {}", options.config.migrations_dir.join(filename).display());
    if kind == MigrationKind::Rust {
        println!("Rust migrations are not loaded by `tidemark up`; register it in your application's MigrationRegistry");
    }
    Ok(())
}

fn render_status(statuses: &[MigrationStatus]) -> String {
    if statuses.is_empty() {
        return "No migrations found\n".to_string();
    }

    let width = statuses.iter().map(|s| s.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for status in statuses {
        let state = match status.applied_at {
            Some(at) => format!("applied {}", at.format("%Y-%m-%d %H:%M:%S")),
            None if status.is_applied() => "applied".to_string(),
            None => "pending".to_string(),
        };
        out.push_str(&format!("{:<width$}  {}\n", status.name, state, width = width));
    }

    let pending = statuses.iter().filter(|s| !s.is_applied()).count();
    out.push_str(&format!("\n{} applied, {} pending\n", statuses.len() - pending, pending));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn options(temp_dir: &TempDir) -> MigrateOptions {
        let url = format!("sqlite://{}", temp_dir.path().join("app.db").display());
        MigrateOptions::new(Some(url), temp_dir.path().join("migrations"), "migrations".to_string(), 20).unwrap()
    }

    #[test]
    fn rejects_invalid_table_name() {
        assert!(MigrateOptions::new(None, PathBuf::from("migrations"), "bad name".to_string(), 20).is_err());
        assert!(MigrateOptions::new(None, PathBuf::from("migrations"), "migrations".to_string(), 0).is_err());
    }

    #[tokio::test]
    async fn missing_database_url_is_reported() {
        let options = MigrateOptions::new(None, PathBuf::from("migrations"), "migrations".to_string(), 20).unwrap();
        let err = options.connect().await.err().unwrap();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[tokio::test]
    async fn make_then_up_applies_sql_migration() {
        let temp_dir = TempDir::new().unwrap();
        let options = options(&temp_dir);

        make(&options, "create_users", MigrationKind::Sql).unwrap();
        let dir = temp_dir.path().join("migrations");
        let file = fs::read_dir(&dir).unwrap().next().unwrap().unwrap().path();
        let content = fs::read_to_string(&file)
            .unwrap()
            .replace("-- Add your schema changes here", "CREATE TABLE users (id INTEGER PRIMARY KEY);")
            .replace("-- Add rollback statements here", "DROP TABLE users;");
        fs::write(&file, content).unwrap();

        up(&options).await.unwrap();

        let runner = options.runner().await.unwrap();
        let statuses = runner.status().await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].is_applied());
        assert!(statuses[0].name.ends_with("_create_users"));
    }

    #[test]
    fn rust_stub_conflicts_with_sql_file_of_same_name() {
        let temp_dir = TempDir::new().unwrap();
        let options = options(&temp_dir);

        make(&options, "create_users", MigrationKind::Sql).unwrap();
        assert!(make(&options, "create_users", MigrationKind::Rust).is_err());
        assert_eq!(fs::read_dir(temp_dir.path().join("migrations")).unwrap().count(), 1);
    }

    #[test]
    fn renders_status_table() {
        let statuses = vec![
            MigrationStatus {
                name: "1_a".to_string(),
                state: tidemark::MigrationState::Applied,
                applied_at: None,
            },
            MigrationStatus {
                name: "2_longer".to_string(),
                state: tidemark::MigrationState::Pending,
                applied_at: None,
            },
        ];

        let rendered = render_status(&statuses);
        assert!(rendered.contains("1_a       applied\n"));
        assert!(rendered.contains("2_longer  pending\n"));
        assert!(rendered.ends_with("1 applied, 1 pending\n"));
        assert_eq!(render_status(&[]), "No migrations found\n");
    }
}
