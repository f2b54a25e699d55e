//! Migration Registry - the set of migrations known to this process
//!
//! The host application builds one registry at startup, before any runner
//! method is called. Names are unique: registering a name twice is rejected
//! instead of silently replacing the earlier migration.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::definitions::Migration;
use super::loader::MigrationLoader;
use crate::error::{MigrationError, MigrationResult};

/// Mapping from migration name to implementation
#[derive(Clone, Default)]
pub struct MigrationRegistry {
    migrations: HashMap<String, Arc<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `(name, migration)` pairs, rejecting duplicate names
    pub fn from_migrations<I, N>(migrations: I) -> MigrationResult<Self>
    where
        I: IntoIterator<Item = (N, Arc<dyn Migration>)>,
        N: Into<String>,
    {
        let mut registry = Self::new();
        for (name, migration) in migrations {
            registry.register_arc(name, migration)?;
        }
        Ok(registry)
    }

    /// Build a registry from the `*.sql` files of a migrations directory
    pub fn from_directory(dir: impl AsRef<Path>) -> MigrationResult<Self> {
        let migrations = MigrationLoader::new(dir.as_ref())
            .load_sql_migrations()?
            .into_iter()
            .map(|(name, migration)| (name, Arc::new(migration) as Arc<dyn Migration>));

        Self::from_migrations(migrations)
    }

    /// Add a migration under `name`
    pub fn register<M>(&mut self, name: impl Into<String>, migration: M) -> MigrationResult<()>
    where
        M: Migration + 'static,
    {
        self.register_arc(name, Arc::new(migration))
    }

    /// Add an already shared migration under `name`
    pub fn register_arc(&mut self, name: impl Into<String>, migration: Arc<dyn Migration>) -> MigrationResult<()> {
        let name = name.into();
        if self.migrations.contains_key(&name) {
            return Err(MigrationError::DuplicateRegistration { name });
        }

        debug!(migration = %name, "Registered migration");
        self.migrations.insert(name, migration);
        Ok(())
    }

    /// Chaining form of [`register`](Self::register)
    pub fn with<M>(mut self, name: impl Into<String>, migration: M) -> MigrationResult<Self>
    where
        M: Migration + 'static,
    {
        self.register(name, migration)?;
        Ok(self)
    }

    /// All registered names, in no particular order
    pub fn names(&self) -> HashSet<&str> {
        self.migrations.keys().map(String::as_str).collect()
    }

    /// Look up the migration registered under `name`
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Migration>> {
        self.migrations.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.migrations.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.migrations.keys().collect();
        names.sort();
        f.debug_struct("MigrationRegistry").field("migrations", &names).finish()
    }
}
