//! Operator-facing progress reporting for migration runs

use tracing::{error, info};

/// Sink for migration progress and failure messages
///
/// Migration bodies receive the runner's logger so that their own messages end
/// up in the same place as the runner's.
pub trait MigrationLogger: Send + Sync {
    fn info(&self, message: &str);

    fn error(&self, message: &str);
}

/// Forwards messages to `tracing` under the `tidemark::migrations` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl MigrationLogger for TracingLogger {
    fn info(&self, message: &str) {
        info!(target: "tidemark::migrations", "{}", message);
    }

    fn error(&self, message: &str) {
        error!(target: "tidemark::migrations", "{}", message);
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl MigrationLogger for NullLogger {
    fn info(&self, _message: &str) {}

    fn error(&self, _message: &str) {}
}
