//! Migration status tracking

use crate::migration::{LedgerRecord, MigrationScript};

/// Ledger contents compared against the scripts on disk
///
/// A script counts as applied only when the ledger holds its version with the
/// same stored description, which is the rule `up` uses to skip it.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Applied migrations whose up-script is still on disk
    pub applied: Vec<LedgerRecord>,

    /// Up-scripts with no ledger record, in run order
    pub pending: Vec<MigrationScript>,

    /// Up-scripts whose version is recorded for a different script; `up`
    /// refuses them
    pub conflicting: Vec<MigrationScript>,

    /// Ledger records whose up-script is gone
    pub orphaned: Vec<LedgerRecord>,

    /// Number of applied migrations (including orphaned records)
    pub applied_count: usize,

    /// Number of pending migrations
    pub pending_count: usize,
}

impl MigrationStatus {
    /// Split ledger records and on-disk scripts by version and stored
    /// description.
    #[must_use]
    pub fn new(records: Vec<LedgerRecord>, scripts: Vec<MigrationScript>) -> Self {
        let same_script = |r: &LedgerRecord, s: &MigrationScript| {
            s.version == r.version && s.ledger_description() == r.description
        };

        let (applied, orphaned): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|r| scripts.iter().any(|s| same_script(r, s)));

        let mut pending = Vec::new();
        let mut conflicting = Vec::new();
        for script in scripts {
            if applied.iter().any(|r| same_script(r, &script)) {
                continue;
            }
            let version_taken = applied
                .iter()
                .chain(&orphaned)
                .any(|r| r.version == script.version);
            if version_taken {
                conflicting.push(script);
            } else {
                pending.push(script);
            }
        }

        let applied_count = applied.len() + orphaned.len();
        let pending_count = pending.len();

        Self {
            applied,
            pending,
            conflicting,
            orphaned,
            applied_count,
            pending_count,
        }
    }

    /// Check if all migrations are applied
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count == 0
    }

    /// Get the latest applied migration version
    #[must_use]
    pub fn latest_applied_version(&self) -> Option<&str> {
        self.applied
            .iter()
            .chain(&self.orphaned)
            .map(|r| r.version.as_str())
            .max()
    }

    /// Get the next pending migration version
    #[must_use]
    pub fn next_pending_version(&self) -> Option<&str> {
        self.pending.first().map(|s| s.version.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use std::path::Path;

    fn record(version: &str) -> LedgerRecord {
        LedgerRecord::new(version, "x.up.sql", NaiveDateTime::default())
    }

    fn script(version: &str) -> MigrationScript {
        named_script(version, "x")
    }

    fn named_script(version: &str, description: &str) -> MigrationScript {
        MigrationScript::from_ledger(Path::new("m"), version, &format!("{description}.up.sql"))
            .unwrap()
    }

    #[test]
    fn test_status_partitions_applied_pending_and_orphaned() {
        let status = MigrationStatus::new(
            vec![record("20240101-000000"), record("20240102-000000")],
            vec![script("20240101-000000"), script("20240103-000000")],
        );

        assert_eq!(status.applied.len(), 1);
        assert_eq!(status.orphaned.len(), 1);
        assert_eq!(status.orphaned[0].version, "20240102-000000");
        assert_eq!(status.pending_count, 1);
        assert_eq!(status.applied_count, 2);
        assert!(!status.is_up_to_date());
        assert_eq!(status.latest_applied_version(), Some("20240102-000000"));
        assert_eq!(status.next_pending_version(), Some("20240103-000000"));
    }

    #[test]
    fn test_script_sharing_an_applied_version_is_conflicting() {
        let status = MigrationStatus::new(
            vec![record("20240101-000000")],
            vec![script("20240101-000000"), named_script("20240101-000000", "y")],
        );

        assert_eq!(status.applied.len(), 1);
        assert!(status.pending.is_empty());
        assert_eq!(status.conflicting.len(), 1);
        assert_eq!(status.conflicting[0].description, "y");
        assert!(status.is_up_to_date());
    }

    #[test]
    fn test_renamed_script_is_conflicting_and_record_orphaned() {
        let status = MigrationStatus::new(
            vec![record("20240101-000000")],
            vec![named_script("20240101-000000", "renamed")],
        );

        assert!(status.applied.is_empty());
        assert_eq!(status.orphaned.len(), 1);
        assert_eq!(status.conflicting.len(), 1);
        assert_eq!(status.pending_count, 0);
    }

    #[test]
    fn test_empty_status_is_up_to_date() {
        let status = MigrationStatus::new(vec![], vec![]);
        assert!(status.is_up_to_date());
        assert_eq!(status.latest_applied_version(), None);
        assert_eq!(status.next_pending_version(), None);
    }
}
