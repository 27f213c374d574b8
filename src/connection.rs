//! Connection Module
//!
//! Turns a [`MigConfig`] into MySQL connection options and opens the single
//! connection a CLI invocation runs on.

use crate::config::MigConfig;
use mysql::prelude::Queryable;
use mysql::{Conn, Opts, OptsBuilder};
use std::fmt;

/// Connection error type
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Network/authentication error from the MySQL driver
    #[error("cannot connect to {dsn}: {source}")]
    Mysql {
        dsn: String,
        #[source]
        source: mysql::Error,
    },
}

/// Parameters needed to reach the target database.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionSettings {
    pub fn from_config(config: &MigConfig) -> Self {
        Self {
            host: config.db_host.clone(),
            port: config.db_port,
            user: config.db_user.clone(),
            password: Some(config.db_pass.clone()).filter(|p| !p.is_empty()),
            database: config.db_name.clone(),
        }
    }

    /// Printable data source name with the password redacted.
    ///
    /// `user@tcp(host:port)/db` without a password, `user:***@tcp(host:port)/db` with one.
    pub fn dsn(&self) -> String {
        match self.password {
            Some(_) => format!(
                "{}:***@tcp({}:{})/{}",
                self.user, self.host, self.port, self.database
            ),
            None => format!(
                "{}@tcp({}:{})/{}",
                self.user, self.host, self.port, self.database
            ),
        }
    }

    /// Driver options; the password is left unset when empty.
    pub fn opts(&self) -> Opts {
        OptsBuilder::new()
            .ip_or_hostname(Some(self.host.clone()))
            .tcp_port(self.port)
            .user(Some(self.user.clone()))
            .pass(self.password.clone())
            .db_name(Some(self.database.clone()))
            .into()
    }
}

/// Open a connection and verify it with a round trip.
///
/// # Errors
///
/// Returns [`ConnectionError`] when the server is unreachable or rejects the
/// credentials. Callers treat this as fatal.
pub fn connect(settings: &ConnectionSettings) -> Result<Conn, ConnectionError> {
    let wrap = |source| ConnectionError::Mysql {
        dsn: settings.dsn(),
        source,
    };

    log::debug!("connecting to {}", settings.dsn());
    let mut conn = Conn::new(settings.opts()).map_err(wrap)?;
    conn.query_drop("SELECT 1").map_err(wrap)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dsn_without_password_uses_unauthenticated_form() {
        let settings = ConnectionSettings::from_config(&MigConfig::default());
        assert_eq!(settings.password, None);
        assert_eq!(settings.dsn(), "root@tcp(localhost:3306)/bte");
    }

    #[test]
    fn test_dsn_with_password_is_redacted() {
        let config = MigConfig {
            db_pass: "hunter2".to_string(),
            db_port: 3310,
            ..MigConfig::default()
        };
        let settings = ConnectionSettings::from_config(&config);
        assert_eq!(settings.password.as_deref(), Some("hunter2"));
        assert_eq!(settings.dsn(), "root:***@tcp(localhost:3310)/bte");
        assert!(!format!("{settings:?}").contains("hunter2"));
    }

    #[test]
    fn test_opts_carry_settings() {
        let config = MigConfig {
            db_host: "db.internal".to_string(),
            db_user: "deploy".to_string(),
            db_pass: "pw".to_string(),
            ..MigConfig::default()
        };
        let opts = ConnectionSettings::from_config(&config).opts();
        assert_eq!(opts.get_ip_or_hostname(), "db.internal");
        assert_eq!(opts.get_tcp_port(), 3306);
        assert_eq!(opts.get_user(), Some("deploy"));
        assert_eq!(opts.get_pass(), Some("pw"));
        assert_eq!(opts.get_db_name(), Some("bte"));
    }
}
