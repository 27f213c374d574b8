//! Executor Module
//!
//! Provides the [`ScriptExecutor`] trait the migration engine runs scripts
//! through, and [`MysqlExecutor`], the implementation backed by a single
//! `mysql::Conn`.

use mysql::prelude::Queryable;
use mysql::Conn;
use std::cell::{RefCell, RefMut};

/// MySQL server error code for a duplicate primary/unique key.
const ER_DUP_ENTRY: u16 = 1062;

/// Executor error type
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Error reported by the MySQL driver or server
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql::Error),
    /// Other execution errors
    #[error("execution error: {0}")]
    Other(String),
}

impl ExecutorError {
    /// Whether the server rejected a write because the key already exists.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, ExecutorError::Mysql(mysql::Error::MySqlError(e)) if e.code == ER_DUP_ENTRY)
    }
}

/// Runs migration script bodies against the target database.
///
/// The engine treats the executor as opaque: a script either runs to
/// completion or fails with an [`ExecutorError`].
pub trait ScriptExecutor {
    /// Execute `script` verbatim. Scripts may contain several `;`-separated
    /// statements.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if any statement in the script fails.
    fn execute_script(&self, script: &str) -> Result<(), ExecutorError>;
}

/// Implementation of [`ScriptExecutor`] for a `mysql::Conn`.
///
/// The connection is acquired once per process and released when the
/// executor is dropped. Interior mutability lets the engine and the ledger
/// share it through `&self` on a single thread.
pub struct MysqlExecutor {
    conn: RefCell<Conn>,
}

impl MysqlExecutor {
    /// Create a new executor from an open connection
    pub fn new(conn: Conn) -> Self {
        Self {
            conn: RefCell::new(conn),
        }
    }

    /// Borrow the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Other` if the connection is already borrowed,
    /// which only happens on re-entrant use.
    pub fn conn(&self) -> Result<RefMut<'_, Conn>, ExecutorError> {
        self.conn
            .try_borrow_mut()
            .map_err(|_| ExecutorError::Other("connection is already in use".to_string()))
    }

    /// Consume the executor and return the underlying connection
    pub fn into_conn(self) -> Conn {
        self.conn.into_inner()
    }
}

impl ScriptExecutor for MysqlExecutor {
    fn execute_script(&self, script: &str) -> Result<(), ExecutorError> {
        let mut conn = self.conn()?;
        let mut result = conn.query_iter(script)?;
        // `query_iter` only reports the first statement's outcome, and dropping
        // the result discards later errors, so every set is read explicitly.
        while let Some(set) = result.iter() {
            for row in set {
                row?;
            }
        }
        Ok(())
    }
}
