//! Migration Runner - Executes migrations against the database
//!
//! Every migration runs in its own transaction together with its ledger
//! write. `up_all` applies pending migrations in ascending name order and
//! stops at the first failure; migrations committed before the failure stay
//! committed.
//!
//! Concurrent runs from several processes against the same database are not
//! coordinated: both may compute the same pending set. Run migrations from a
//! single process or under an external lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::definitions::{
    LedgerRecord, Migration, MigrationDirection, MigrationRunResult, MigrationState, MigrationStatus,
};
use super::ledger::Ledger;
use super::registry::MigrationRegistry;
use super::scaffold::{MigrationKind, MigrationScaffolder};
use crate::backends::{DatabasePool, DatabaseTransaction};
use crate::config::MigrationConfig;
use crate::error::{MigrationError, MigrationResult};
use crate::logger::{MigrationLogger, TracingLogger};
use crate::transaction::TransactionHandle;

/// Sort `all_names` ascending and drop the ones in `already_applied`
pub fn pending_names<S: AsRef<str>>(all_names: &[S], already_applied: &HashSet<String>) -> Vec<String> {
    let mut names: Vec<&str> = all_names.iter().map(AsRef::as_ref).collect();
    names.sort_unstable();
    names.dedup();

    names
        .into_iter()
        .filter(|name| !already_applied.contains(*name))
        .map(str::to_string)
        .collect()
}

/// Migration runner that executes registered migrations against a database
pub struct MigrationRunner {
    pool: Arc<dyn DatabasePool>,
    registry: MigrationRegistry,
    config: MigrationConfig,
    logger: Arc<dyn MigrationLogger>,
}

impl MigrationRunner {
    /// Create a runner with the default configuration and a tracing logger
    pub fn new(pool: Arc<dyn DatabasePool>, registry: MigrationRegistry) -> Self {
        Self {
            pool,
            registry,
            config: MigrationConfig::default(),
            logger: Arc::new(TracingLogger),
        }
    }

    pub fn with_config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn MigrationLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Configuration is read at the start of every operation, so changes apply to the next run
    pub fn config_mut(&mut self) -> &mut MigrationConfig {
        &mut self.config
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<dyn DatabasePool> {
        &self.pool
    }

    fn ledger(&self) -> MigrationResult<Ledger<'_>> {
        self.config.validate()?;
        Ok(Ledger::new(
            self.pool.as_ref(),
            &self.config.migrations_table,
            self.config.chunk_size,
        ))
    }

    fn lookup(&self, name: &str) -> MigrationResult<Arc<dyn Migration>> {
        self.registry
            .lookup(name)
            .ok_or_else(|| MigrationError::UnknownMigration { name: name.to_string() })
    }

    fn registered_names(&self) -> Vec<String> {
        self.registry.names().into_iter().map(str::to_string).collect()
    }

    /// Compute the pending set, creating the ledger table if needed
    ///
    /// A freshly created ledger is empty, so every registered name is pending
    /// and the existence query is skipped.
    async fn compute_pending(&self, ledger: &Ledger<'_>) -> MigrationResult<(Vec<String>, usize)> {
        let names = self.registered_names();

        let applied = if ledger.ensure_table().await? {
            HashSet::new()
        } else {
            ledger.applied_names(&names).await?
        };

        Ok((pending_names(&names, &applied), applied.len()))
    }

    /// Names of the registered migrations not yet applied, in the order they would run
    pub async fn pending(&self) -> MigrationResult<Vec<String>> {
        let ledger = self.ledger()?;
        let (pending, _) = self.compute_pending(&ledger).await?;
        Ok(pending)
    }

    /// Apply every pending migration in ascending name order
    pub async fn up_all(&self) -> MigrationResult<MigrationRunResult> {
        let start_time = Instant::now();
        self.logger.info("Start migrations");

        let ledger = self.ledger()?;
        let (pending, skipped_count) = self.compute_pending(&ledger).await?;

        if pending.is_empty() {
            self.logger.info("Nothing to migrate.");
            return Ok(MigrationRunResult {
                applied_migrations: Vec::new(),
                skipped_count,
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        }

        let mut applied_migrations = Vec::with_capacity(pending.len());
        for name in pending {
            let outcome = match self.lookup(&name) {
                Ok(migration) => self.apply(&ledger, &name, migration).await,
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                self.logger.error(&format!("{} migration failed", name));
                return Err(err);
            }
            self.logger.info(&format!("{} migration success", name));
            applied_migrations.push(name);
        }

        self.logger.info("All migrations are done success!");
        Ok(MigrationRunResult {
            applied_migrations,
            skipped_count,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Apply a single migration by name
    ///
    /// The ledger is not consulted first: applying a migration that already has
    /// a ledger row fails on the unique name and rolls back.
    pub async fn up_one(&self, name: &str) -> MigrationResult<()> {
        let ledger = self.ledger()?;
        let migration = self.lookup(name)?;
        ledger.ensure_table().await?;
        self.apply(&ledger, name, migration).await
    }

    /// Revert a single migration by name
    pub async fn down_one(&self, name: &str) -> MigrationResult<()> {
        let ledger = self.ledger()?;
        let migration = self.lookup(name)?;
        ledger.ensure_table().await?;

        let mut tx = self.pool.begin_transaction().await?;
        debug!(migration = name, "Reverting migration");

        let outcome = async {
            let deleted = ledger
                .delete(tx.as_mut(), name)
                .await
                .map_err(|e| MigrationError::failure(name, MigrationDirection::Down, e))?;
            if !deleted {
                warn!(migration = name, "Reverting a migration that has no ledger row");
            }

            let mut handle = TransactionHandle::new(tx.as_mut(), self.pool.sql_dialect());
            migration
                .down(&mut handle, self.logger.as_ref())
                .await
                .map_err(|e| MigrationError::failure(name, MigrationDirection::Down, e))
        }
        .await;

        self.finish(tx, name, outcome).await?;
        self.logger.info(&format!("{} migration reverted", name));
        Ok(())
    }

    /// Build the status list of every registered migration, in ascending name order
    pub async fn status(&self) -> MigrationResult<Vec<MigrationStatus>> {
        let ledger = self.ledger()?;
        let mut names = self.registered_names();
        names.sort_unstable();

        let records = if ledger.ensure_table().await? {
            Vec::new()
        } else {
            ledger.applied_records(&names).await?
        };
        let by_name: HashMap<&str, &LedgerRecord> =
            records.iter().map(|record| (record.name.as_str(), record)).collect();

        Ok(names
            .into_iter()
            .map(|name| match by_name.get(name.as_str()) {
                Some(record) => MigrationStatus {
                    name,
                    state: MigrationState::Applied,
                    applied_at: record.created_at,
                },
                None => MigrationStatus {
                    name,
                    state: MigrationState::Pending,
                    applied_at: None,
                },
            })
            .collect())
    }

    /// Scaffold a new migration file in the configured migrations directory
    pub fn make_migration(&self, name: &str, kind: MigrationKind) -> MigrationResult<String> {
        let filename = MigrationScaffolder::new(&self.config.migrations_dir).create(name, kind)?;
        self.logger.info(&format!("migration file created: {}", filename));
        Ok(filename)
    }

    /// Run the up side of `name` and its ledger insert as one transaction
    async fn apply(&self, ledger: &Ledger<'_>, name: &str, migration: Arc<dyn Migration>) -> MigrationResult<()> {
        let mut tx = self.pool.begin_transaction().await?;
        debug!(migration = name, "Applying migration");

        let outcome = async {
            let mut handle = TransactionHandle::new(tx.as_mut(), self.pool.sql_dialect());
            migration
                .up(&mut handle, self.logger.as_ref())
                .await
                .map_err(|e| MigrationError::failure(name, MigrationDirection::Up, e))?;

            ledger
                .record(tx.as_mut(), name)
                .await
                .map_err(|e| MigrationError::failure(name, MigrationDirection::Up, e))
        }
        .await;

        self.finish(tx, name, outcome).await
    }

    /// Commit on success, roll back on failure and return the original error
    async fn finish(
        &self,
        tx: Box<dyn DatabaseTransaction>,
        name: &str,
        outcome: MigrationResult<()>,
    ) -> MigrationResult<()> {
        match outcome {
            Ok(()) => tx.commit().await,
            Err(err) => {
                debug!(migration = name, error = %err, "Rolling back migration");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(migration = name, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pending_names_sorts_and_subtracts() {
        let all = ["3_c", "1_a", "2_b", "4_d"];
        assert_eq!(pending_names(&all, &applied(&["2_b"])), vec!["1_a", "3_c", "4_d"]);
        assert_eq!(pending_names(&all, &HashSet::new()), vec!["1_a", "2_b", "3_c", "4_d"]);
        assert!(pending_names(&all, &applied(&all)).is_empty());
    }

    #[test]
    fn pending_names_ignores_unknown_applied_entries() {
        let all = vec!["1542299549_first".to_string()];
        let result = pending_names(&all, &applied(&["1000000000_removed"]));
        assert_eq!(result, vec!["1542299549_first"]);
    }

    #[test]
    fn pending_names_matches_sorted_difference() {
        // A few deterministic shuffles of the same universe.
        let universe: Vec<String> = (0..30).map(|i| format!("{:010}_m{}", 1_600_000_000 + i * 37 % 30, i)).collect();
        for step in [1usize, 3, 7] {
            let mut shuffled = universe.clone();
            shuffled.rotate_left(step * 4 % universe.len());
            let already: HashSet<String> = universe.iter().step_by(step + 1).cloned().collect();

            let mut expected: Vec<String> = universe.iter().filter(|n| !already.contains(*n)).cloned().collect();
            expected.sort();

            assert_eq!(pending_names(&shuffled, &already), expected);
        }
    }
}
