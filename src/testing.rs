//! In-memory stand-ins for the database, for tests.
//!
//! Enabled with the `test-helpers` feature.

use crate::executor::{ExecutorError, ScriptExecutor};
use crate::migration::{LedgerRecord, MigrationError, MigrationLedger};
use chrono::Local;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// [`MigrationLedger`] backed by a sorted map, with the same uniqueness rule
/// as the ledger table's primary key.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: RefCell<BTreeMap<String, LedgerRecord>>,
    schema_calls: Cell<usize>,
    fail_removals: Cell<bool>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `remove_applied` fail, as if the delete hit a dead connection.
    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.set(fail);
    }

    /// How many times `ensure_schema` was called.
    pub fn schema_calls(&self) -> usize {
        self.schema_calls.get()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}

impl MigrationLedger for MemoryLedger {
    fn ensure_schema(&self) -> Result<(), MigrationError> {
        self.schema_calls.set(self.schema_calls.get() + 1);
        Ok(())
    }

    fn record_applied(&self, version: &str, description: &str) -> Result<(), MigrationError> {
        let mut records = self.records.borrow_mut();
        if records.contains_key(version) {
            return Err(MigrationError::DuplicateVersion {
                version: version.to_string(),
            });
        }
        records.insert(
            version.to_string(),
            LedgerRecord::new(version, description, Local::now().naive_local()),
        );
        Ok(())
    }

    fn latest(&self) -> Result<Option<LedgerRecord>, MigrationError> {
        Ok(self.records.borrow().values().next_back().cloned())
    }

    fn remove_applied(&self, version: &str) -> Result<(), MigrationError> {
        if self.fail_removals.get() {
            return Err(MigrationError::Ledger(ExecutorError::Other(
                "connection lost".to_string(),
            )));
        }
        self.records
            .borrow_mut()
            .remove(version)
            .map(|_| ())
            .ok_or_else(|| MigrationError::AppliedRecordMissing {
                version: version.to_string(),
            })
    }

    fn list_all(&self) -> Result<Vec<LedgerRecord>, MigrationError> {
        Ok(self.records.borrow().values().cloned().collect())
    }
}

/// [`ScriptExecutor`] that remembers every script it ran successfully and
/// fails scripts containing a configured marker.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    executed: RefCell<Vec<String>>,
    fail_markers: RefCell<Vec<String>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any script whose text contains `marker`.
    pub fn fail_when_contains(&self, marker: impl Into<String>) {
        self.fail_markers.borrow_mut().push(marker.into());
    }

    /// Scripts that ran successfully, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }
}

impl ScriptExecutor for RecordingExecutor {
    fn execute_script(&self, script: &str) -> Result<(), ExecutorError> {
        if let Some(marker) = self
            .fail_markers
            .borrow()
            .iter()
            .find(|m| script.contains(m.as_str()))
        {
            return Err(ExecutorError::Other(format!(
                "script failed at '{marker}'"
            )));
        }
        self.executed.borrow_mut().push(script.to_string());
        Ok(())
    }
}
