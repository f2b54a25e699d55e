//! Migration System
//!
//! Registry of known migrations, the ledger of applied ones, and the runner
//! that applies and reverts them one transaction at a time.

pub mod definitions;
pub mod ledger;
pub mod loader;
pub mod registry;
pub mod runner;
pub mod scaffold;

pub use definitions::*;
pub use ledger::{Ledger, NAME_MAX_LENGTH};
pub use loader::{split_sql_statements, MigrationLoader, SqlMigration};
pub use registry::MigrationRegistry;
pub use runner::{pending_names, MigrationRunner};
pub use scaffold::{MigrationKind, MigrationScaffolder, MigrationTemplateContext};
