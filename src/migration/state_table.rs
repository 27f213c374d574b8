//! Ledger table management
//!
//! The ledger is the single persisted record of which migration versions have
//! been applied. Its primary key on `id` is the only guard against two
//! concurrent runs recording the same version.

use crate::executor::{ExecutorError, MysqlExecutor};
use crate::migration::{LedgerRecord, MigrationError};
use mysql::prelude::Queryable;

/// Width of the `id` (version) column.
pub const MAX_VERSION_LEN: usize = 20;

/// Width of the `action` (description) column.
pub const MAX_DESCRIPTION_LEN: usize = 80;

/// Storage for applied-migration records.
///
/// The engine only mutates the ledger through [`record_applied`](Self::record_applied)
/// and [`remove_applied`](Self::remove_applied).
pub trait MigrationLedger {
    /// Create the ledger table if it does not exist. Idempotent.
    fn ensure_schema(&self) -> Result<(), MigrationError>;

    /// Insert one record.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::DuplicateVersion` if `version` is already recorded.
    fn record_applied(&self, version: &str, description: &str) -> Result<(), MigrationError>;

    /// The record with the highest version, if any.
    fn latest(&self) -> Result<Option<LedgerRecord>, MigrationError>;

    /// Delete the record for `version`.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::AppliedRecordMissing` if no row was deleted.
    fn remove_applied(&self, version: &str) -> Result<(), MigrationError>;

    /// All records, ascending by version.
    fn list_all(&self) -> Result<Vec<LedgerRecord>, MigrationError>;
}

/// [`MigrationLedger`] stored in a MySQL table.
///
/// Column layout: `id varchar(20)` primary key (version), `action varchar(80)`
/// (description), `run_at timestamp` defaulting to the insert time.
pub struct MysqlLedger<'a> {
    executor: &'a MysqlExecutor,
    table: String,
}

impl<'a> MysqlLedger<'a> {
    /// `table` is back-quoted wherever it is interpolated; record values are
    /// always bound as parameters.
    pub fn new(executor: &'a MysqlExecutor, table: &str) -> Self {
        Self {
            executor,
            table: table.to_string(),
        }
    }
}

/// Back-quote an identifier so it can be interpolated into SQL.
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `CREATE TABLE IF NOT EXISTS` statement for a ledger table.
pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         id varchar({}) not null primary key, \
         action varchar({}) default '', \
         run_at timestamp not null default CURRENT_TIMESTAMP\
         ) engine=InnoDB",
        quote_ident(table),
        MAX_VERSION_LEN,
        MAX_DESCRIPTION_LEN
    )
}

fn select_sql(table: &str, order: &str, limit: Option<u32>) -> String {
    let mut sql = format!(
        "SELECT id, action, DATE_FORMAT(run_at, '%Y-%m-%d %H:%i:%s') FROM {} ORDER BY id {}",
        quote_ident(table),
        order
    );
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {n}"));
    }
    sql
}

type LedgerRow = (String, Option<String>, String);

fn to_record((version, action, run_at): LedgerRow) -> Result<LedgerRecord, MigrationError> {
    LedgerRecord::from_columns(version, action.unwrap_or_default(), &run_at)
        .map_err(|msg| MigrationError::Ledger(ExecutorError::Other(msg)))
}

fn ledger_err(e: mysql::Error) -> MigrationError {
    MigrationError::Ledger(ExecutorError::from(e))
}

impl MigrationLedger for MysqlLedger<'_> {
    fn ensure_schema(&self) -> Result<(), MigrationError> {
        let mut conn = self.executor.conn().map_err(MigrationError::Ledger)?;
        conn.query_drop(create_table_sql(&self.table)).map_err(ledger_err)
    }

    fn record_applied(&self, version: &str, description: &str) -> Result<(), MigrationError> {
        let mut conn = self.executor.conn().map_err(MigrationError::Ledger)?;
        let sql = format!(
            "INSERT INTO {} (id, action) VALUES (?, ?)",
            quote_ident(&self.table)
        );

        conn.exec_drop(sql, (version, description))
            .map_err(|e| match ExecutorError::from(e) {
                e if e.is_duplicate_key() => MigrationError::DuplicateVersion {
                    version: version.to_string(),
                },
                e => MigrationError::Ledger(e),
            })
    }

    fn latest(&self) -> Result<Option<LedgerRecord>, MigrationError> {
        let mut conn = self.executor.conn().map_err(MigrationError::Ledger)?;
        conn.query_first::<LedgerRow, _>(select_sql(&self.table, "DESC", Some(1)))
            .map_err(ledger_err)?
            .map(to_record)
            .transpose()
    }

    fn remove_applied(&self, version: &str) -> Result<(), MigrationError> {
        let mut conn = self.executor.conn().map_err(MigrationError::Ledger)?;
        let sql = format!("DELETE FROM {} WHERE id = ?", quote_ident(&self.table));

        conn.exec_drop(sql, (version,)).map_err(ledger_err)?;
        if conn.affected_rows() == 0 {
            return Err(MigrationError::AppliedRecordMissing {
                version: version.to_string(),
            });
        }
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<LedgerRecord>, MigrationError> {
        let mut conn = self.executor.conn().map_err(MigrationError::Ledger)?;
        conn.query::<LedgerRow, _>(select_sql(&self.table, "ASC", None))
            .map_err(ledger_err)?
            .into_iter()
            .map(to_record)
            .collect()
    }
}
