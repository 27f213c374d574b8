//! Migration-specific error types

use crate::executor::ExecutorError;
use std::path::PathBuf;

/// Migration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Migrations directory is missing or not a directory
    #[error("Migrations directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Reading or writing a script file failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file name or stored description does not follow
    /// `<version>_<description>.<up|down>.<ext>`
    #[error("Malformed migration script name '{0}': expected <YYYYMMDD-HHMMSS>_<description>.<up|down>.<ext>")]
    MalformedScriptName(String),

    /// Description passed to `new` cannot be used in a file name
    #[error("Invalid migration description '{0}': use letters, digits, '-' or '_'")]
    InvalidDescription(String),

    /// Version or description does not fit the ledger columns
    #[error("Migration {version} cannot be recorded: '{value}' exceeds {max} characters")]
    LedgerFieldTooLong {
        version: String,
        value: String,
        max: usize,
    },

    /// Every disambiguator for a version is already taken
    #[error("Version collision: all disambiguators for {version} are in use")]
    VersionCollision { version: String },

    /// Down-script for an applied migration is not on disk
    #[error("Migration script not found: {}", path.display())]
    ScriptNotFound { path: PathBuf },

    /// Ledger already holds this version
    #[error("Migration version {version} is already recorded")]
    DuplicateVersion { version: String },

    /// Ledger has no record for this version
    #[error("No applied migration recorded for version {version}")]
    AppliedRecordMissing { version: String },

    /// Migration SQL failed to run
    #[error("Migration {version} ({description}) failed during execution: {source}")]
    ScriptExecution {
        version: String,
        description: String,
        #[source]
        source: ExecutorError,
    },

    /// Revert requested while the ledger is empty
    #[error("No applied migrations to revert")]
    NoAppliedMigrations,

    /// Ledger query or write failed
    #[error("Ledger error: {0}")]
    Ledger(#[source] ExecutorError),

    /// The down-script ran but its ledger record could not be removed
    #[error(
        "Migration {version} was reverted but its ledger record could not be removed: {source}\n\
         The ledger still lists {version} as applied; delete the record manually"
    )]
    LedgerInconsistent {
        version: String,
        #[source]
        source: Box<MigrationError>,
    },
}

impl MigrationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Io {
            path: path.into(),
            source,
        }
    }
}
