//! Runtime configuration for the migration runner.
//!
//! Settings are layered with the `config` crate: an optional
//! `config/mig.toml` file, then the `DBHOST`, `DBPORT`, `DBUSER`, `DBPASS`,
//! `DBNAME`, `MIGDIR` and `MIGTAB` environment variables. Empty values fall
//! back to the built-in defaults. The resulting [`MigConfig`] is built once at
//! startup and handed to the connection, script store and ledger.

use config::{Config, ConfigError, Environment, File, Map};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Optional config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config/mig.toml";

/// Environment variables consulted by [`MigConfig::load`].
pub const ENV_KEYS: [&str; 7] = [
    "DBHOST", "DBPORT", "DBUSER", "DBPASS", "DBNAME", "MIGDIR", "MIGTAB",
];

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3306;
const DEFAULT_USER: &str = "root";
const DEFAULT_DB_NAME: &str = "bte";
const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
const DEFAULT_LEDGER_TABLE: &str = "migration_log";

static TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("static regex"));

/// Errors raised while building a [`MigConfig`].
#[derive(Debug, thiserror::Error)]
pub enum MigConfigError {
    /// A source could not be read or deserialized
    #[error("failed to load configuration: {0}")]
    Source(#[from] ConfigError),
    /// `DBPORT` is not a valid TCP port
    #[error("invalid database port '{0}'")]
    InvalidPort(String),
    /// `MIGTAB` is not a plain SQL identifier
    #[error("invalid ledger table name '{0}': expected letters, digits and underscores")]
    InvalidTableName(String),
}

/// Raw values as they come out of the layered sources; everything is optional
/// text until defaults and validation are applied.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    dbhost: Option<String>,
    dbport: Option<String>,
    dbuser: Option<String>,
    dbpass: Option<String>,
    dbname: Option<String>,
    migdir: Option<String>,
    migtab: Option<String>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigConfig {
    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    /// Empty means "connect without a password"
    pub db_pass: String,
    pub db_name: String,
    pub migrations_dir: PathBuf,
    pub ledger_table: String,
}

impl Default for MigConfig {
    fn default() -> Self {
        Self {
            db_host: DEFAULT_HOST.to_string(),
            db_port: DEFAULT_PORT,
            db_user: DEFAULT_USER.to_string(),
            db_pass: String::new(),
            db_name: DEFAULT_DB_NAME.to_string(),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }
}

impl MigConfig {
    /// Load from `config/mig.toml` (if present) and the process environment.
    pub fn load() -> Result<Self, MigConfigError> {
        let mut env = Map::new();
        for key in ENV_KEYS {
            if let Ok(value) = std::env::var(key) {
                env.insert(key.to_string(), value);
            }
        }
        Self::from_sources(Some(Path::new(DEFAULT_CONFIG_FILE)), env)
    }

    /// Build from an explicit environment map without reading any file.
    pub fn from_env_map(env: Map<String, String>) -> Result<Self, MigConfigError> {
        Self::from_sources(None, env)
    }

    /// Build from an optional TOML file overlaid with `env`.
    ///
    /// The file is optional even when a path is given; a missing file is
    /// skipped, an unreadable or malformed one is an error.
    pub fn from_sources(
        file: Option<&Path>,
        env: Map<String, String>,
    ) -> Result<Self, MigConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }
        let settings = builder
            .add_source(Environment::default().source(Some(env)))
            .build()?;

        let raw: RawConfig = settings.try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, MigConfigError> {
        let defaults = Self::default();

        let db_port = match non_empty(raw.dbport) {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .map_err(|_| MigConfigError::InvalidPort(port.clone()))?,
            None => defaults.db_port,
        };

        let ledger_table = non_empty(raw.migtab).unwrap_or(defaults.ledger_table);
        if !TABLE_NAME_RE.is_match(&ledger_table) {
            return Err(MigConfigError::InvalidTableName(ledger_table));
        }

        Ok(Self {
            db_host: non_empty(raw.dbhost).unwrap_or(defaults.db_host),
            db_port,
            db_user: non_empty(raw.dbuser).unwrap_or(defaults.db_user),
            db_pass: raw.dbpass.unwrap_or_default(),
            db_name: non_empty(raw.dbname).unwrap_or(defaults.db_name),
            migrations_dir: non_empty(raw.migdir)
                .map(PathBuf::from)
                .unwrap_or(defaults.migrations_dir),
            ledger_table,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = MigConfig::from_env_map(Map::new()).unwrap();
        assert_eq!(config, MigConfig::default());
        assert_eq!(config.db_port, 3306);
        assert_eq!(config.db_user, "root");
        assert_eq!(config.db_name, "bte");
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
        assert_eq!(config.ledger_table, "migration_log");
        assert!(config.db_pass.is_empty());
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let config = MigConfig::from_env_map(env(&[
            ("DBHOST", "db.internal"),
            ("DBPORT", "3307"),
            ("DBUSER", "deploy"),
            ("DBPASS", "s3cret"),
            ("DBNAME", "shop"),
            ("MIGDIR", "sql/migrations"),
            ("MIGTAB", "schema_log"),
        ]))
        .unwrap();

        assert_eq!(config.db_host, "db.internal");
        assert_eq!(config.db_port, 3307);
        assert_eq!(config.db_user, "deploy");
        assert_eq!(config.db_pass, "s3cret");
        assert_eq!(config.db_name, "shop");
        assert_eq!(config.migrations_dir, PathBuf::from("sql/migrations"));
        assert_eq!(config.ledger_table, "schema_log");
    }

    #[test]
    fn test_empty_values_fall_back_to_defaults() {
        let config =
            MigConfig::from_env_map(env(&[("DBPORT", ""), ("DBNAME", ""), ("MIGTAB", "")]))
                .unwrap();
        assert_eq!(config.db_port, 3306);
        assert_eq!(config.db_name, "bte");
        assert_eq!(config.ledger_table, "migration_log");
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = MigConfig::from_env_map(env(&[("DBPORT", "mysql")])).unwrap_err();
        assert!(matches!(err, MigConfigError::InvalidPort(p) if p == "mysql"));
    }

    #[test]
    fn test_table_name_must_be_identifier() {
        let err = MigConfig::from_env_map(env(&[("MIGTAB", "log; DROP TABLE users")]))
            .unwrap_err();
        assert!(matches!(err, MigConfigError::InvalidTableName(_)));
    }

    #[test]
    fn test_file_is_overlaid_by_environment() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mig.toml");
        fs::write(&path, "dbhost = \"from-file\"\ndbname = \"filedb\"\n").unwrap();

        let config = MigConfig::from_sources(Some(&path), env(&[("DBNAME", "envdb")])).unwrap();
        assert_eq!(config.db_host, "from-file");
        assert_eq!(config.db_name, "envdb");
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        let config = MigConfig::from_sources(Some(&path), Map::new()).unwrap();
        assert_eq!(config, MigConfig::default());
    }
}
