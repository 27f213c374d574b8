//! Migration system
//!
//! This module provides the migration engine, including:
//! - Script discovery, parsing and creation ([`ScriptStore`])
//! - The ledger of applied versions ([`MigrationLedger`], [`MysqlLedger`])
//! - Migration execution and revert ([`Migrator`])
//!
//! # Example
//!
//! ```rust,no_run
//! use mig::{connect, ConnectionSettings, MigConfig, MysqlExecutor};
//! use mig::migration::{Migrator, MysqlLedger, ScriptStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MigConfig::load()?;
//! let executor = MysqlExecutor::new(connect(&ConnectionSettings::from_config(&config))?);
//! let ledger = MysqlLedger::new(&executor, &config.ledger_table);
//! let store = ScriptStore::from_config(&config);
//!
//! let migrator = Migrator::new(&store, &ledger, &executor);
//! migrator.ensure_ledger()?;
//! let report = migrator.up(false)?;
//! println!("applied {} migration(s)", report.applied_count());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod file;
pub mod migrator;
pub mod record;
pub mod state_table;
pub mod status;

pub use error::MigrationError;
pub use file::{Direction, MigrationScript, ScriptName, ScriptStore};
pub use migrator::{Migrator, ScriptOutcome, UpReport};
pub use record::LedgerRecord;
pub use state_table::{MigrationLedger, MysqlLedger};
pub use status::MigrationStatus;
