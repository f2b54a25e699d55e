//! Migration Scaffolder - writes new migration source files from templates

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tera::{Context, Tera};
use tracing::info;

use crate::error::{MigrationError, MigrationResult};

const RUST_TEMPLATE: &str = r#"//! Migration {{ migration_name }}
//!
//! Register it in `{{ module_name }}`:
//!
//!     registry.register("{{ migration_name }}", {{ struct_name }})?;

use async_trait::async_trait;
use tidemark::{Migration, MigrationLogger, MigrationResult, TransactionHandle};

pub struct {{ struct_name }};

#[async_trait]
impl Migration for {{ struct_name }} {
    async fn up(&self, tx: &mut TransactionHandle<'_>, log: &dyn MigrationLogger) -> MigrationResult<()> {
        let _ = (tx, log);
        Ok(())
    }

    async fn down(&self, tx: &mut TransactionHandle<'_>, log: &dyn MigrationLogger) -> MigrationResult<()> {
        let _ = (tx, log);
        Ok(())
    }
}
"#;

const SQL_TEMPLATE: &str = r#"-- Migration: {{ migration_name }}
-- Created: {{ created_at }}

-- Up migration
-- Add your schema changes here


-- Down migration
-- Add rollback statements here

"#;

/// Kind of source file to scaffold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationKind {
    #[default]
    Rust,
    Sql,
}

impl MigrationKind {
    pub fn extension(&self) -> &'static str {
        match self {
            MigrationKind::Rust => "rs",
            MigrationKind::Sql => "sql",
        }
    }

    fn template(&self) -> &'static str {
        match self {
            MigrationKind::Rust => RUST_TEMPLATE,
            MigrationKind::Sql => SQL_TEMPLATE,
        }
    }
}

/// Values substituted into a migration template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationTemplateContext {
    /// `Migration` followed by the PascalCase parts of the name
    pub struct_name: String,
    /// Last component of the migrations directory
    pub module_name: String,
    /// Full migration name, `<unix_timestamp>_<name>`
    pub migration_name: String,
}

impl MigrationTemplateContext {
    pub fn new(name: &str, dir: &Path, timestamp: i64) -> Self {
        let module_name = dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("migrations")
            .to_string();

        Self {
            struct_name: struct_name(name),
            module_name,
            migration_name: format!("{}_{}", timestamp, name),
        }
    }
}

/// `create_users` -> `MigrationCreateUsers`
fn struct_name(name: &str) -> String {
    let mut result = String::from("Migration");
    for part in name.split(|c: char| c == '_' || c == '-' || c.is_whitespace()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            result.extend(first.to_uppercase());
            result.push_str(chars.as_str());
        }
    }
    result
}

/// Creates migration files in a directory
pub struct MigrationScaffolder {
    dir: PathBuf,
}

impl MigrationScaffolder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `<unix_timestamp>_<name>.<ext>` and return the file name
    pub fn create(&self, name: &str, kind: MigrationKind) -> MigrationResult<String> {
        validate_name(name)?;

        if !self.dir.exists() {
            info!("Create new directory : {}", self.dir.display());
            fs::create_dir_all(&self.dir)?;
        }

        if self.file_exists(name)? {
            return Err(MigrationError::ScaffoldConflict {
                name: name.to_string(),
                dir: self.dir.clone(),
            });
        }

        let timestamp = Utc::now().timestamp();
        let context = MigrationTemplateContext::new(name, &self.dir, timestamp);
        let content = render(kind, &context)?;

        let filename = format!("{}.{}", context.migration_name, kind.extension());
        fs::write(self.dir.join(&filename), content)?;

        Ok(filename)
    }

    /// Whether a file for the logical `name` exists, whatever its extension
    fn file_exists(&self, name: &str) -> MigrationResult<bool> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.split_once('_').map_or(false, |(_, rest)| rest == name) {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

fn validate_name(name: &str) -> MigrationResult<()> {
    if name.trim().is_empty() {
        return Err(MigrationError::Configuration("Migration name must not be empty".to_string()));
    }
    if name.contains(['/', '\\', '.']) {
        return Err(MigrationError::Configuration(format!(
            "Migration name '{}' must not contain path separators or dots",
            name
        )));
    }
    Ok(())
}

fn render(kind: MigrationKind, context: &MigrationTemplateContext) -> MigrationResult<String> {
    let mut tera_context = Context::from_serialize(context)?;
    tera_context.insert("created_at", &Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string());

    Ok(Tera::one_off(kind.template(), &tera_context, false)?)
}
