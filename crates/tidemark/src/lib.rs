//! # tidemark: ordered, transactional database migrations
//!
//! Migrations are registered by name in a [`MigrationRegistry`]. The
//! [`MigrationRunner`] compares the registry against a ledger table in the
//! database and applies whatever is pending, in ascending name order, each
//! migration in its own transaction together with its ledger row.
//!
//! ```ignore
//! let pool = tidemark::backends::connect(&database_url, &DatabasePoolConfig::default()).await?;
//! let registry = MigrationRegistry::new()
//!     .with("1542299549_create_users", CreateUsers)?
//!     .with("1542299600_create_posts", CreatePosts)?;
//!
//! let result = MigrationRunner::new(pool, registry).up_all().await?;
//! println!("applied {} migrations", result.applied_count());
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod logger;
pub mod migrations;
pub mod transaction;

pub use backends::{
    DatabaseBackendType, DatabasePool, DatabasePoolConfig, DatabaseRow, DatabaseTransaction, DatabaseValue,
    SqlDialect,
};
pub use config::MigrationConfig;
pub use error::{MigrationError, MigrationResult};
pub use logger::{MigrationLogger, NullLogger, TracingLogger};
pub use migrations::*;
pub use transaction::TransactionHandle;
