//! # mig
//!
//! Timestamp-versioned SQL migration runner for MySQL.
//!
//! Migration scripts live on disk as `<version>_<description>.up.sql` /
//! `<version>_<description>.down.sql` pairs. Applied versions are tracked in a
//! ledger table; the [`migration::Migrator`] applies pending scripts in version
//! order and reverts the most recently applied one.

pub mod config;
pub mod connection;
pub mod executor;
pub mod migration;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use config::{MigConfig, MigConfigError};
pub use connection::{connect, ConnectionError, ConnectionSettings};
pub use executor::{ExecutorError, MysqlExecutor, ScriptExecutor};
pub use migration::{
    LedgerRecord, MigrationError, MigrationLedger, MigrationScript, MigrationStatus, Migrator,
    MysqlLedger, ScriptStore,
};
