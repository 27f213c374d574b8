//! Migrator - Core migration execution engine

use crate::executor::ScriptExecutor;
use crate::migration::state_table::{MAX_DESCRIPTION_LEN, MAX_VERSION_LEN};
use crate::migration::{
    LedgerRecord, MigrationError, MigrationLedger, MigrationScript, MigrationStatus, ScriptStore,
};
use std::collections::HashMap;

/// What happened to one up-script during [`Migrator::up`].
#[derive(Debug)]
pub enum ScriptOutcome {
    /// Executed and recorded in the ledger
    Applied(MigrationScript),
    /// Already recorded; not executed
    AlreadyApplied(MigrationScript),
    /// Pending; listed only because of a dry run
    WouldApply(MigrationScript),
    /// Not applied; the sweep moved on to the next script
    Failed {
        script: MigrationScript,
        error: MigrationError,
    },
}

impl ScriptOutcome {
    pub fn script(&self) -> &MigrationScript {
        match self {
            ScriptOutcome::Applied(s)
            | ScriptOutcome::AlreadyApplied(s)
            | ScriptOutcome::WouldApply(s)
            | ScriptOutcome::Failed { script: s, .. } => s,
        }
    }
}

/// Result of an `up` sweep, in run order.
#[derive(Debug, Default)]
pub struct UpReport {
    pub outcomes: Vec<ScriptOutcome>,
}

impl UpReport {
    pub fn applied(&self) -> impl Iterator<Item = &MigrationScript> {
        self.outcomes.iter().filter_map(|o| match o {
            ScriptOutcome::Applied(s) => Some(s),
            _ => None,
        })
    }

    pub fn applied_count(&self) -> usize {
        self.applied().count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ScriptOutcome::Failed { .. }))
            .count()
    }
}

type ProgressHook<'a> = Box<dyn Fn(&ScriptOutcome) + 'a>;

/// Core migration execution engine
///
/// The `Migrator` computes pending scripts, applies them in version order
/// and reverts the most recently applied one. It owns no state: scripts are
/// read from the [`ScriptStore`] and applied versions from the
/// [`MigrationLedger`] on every call.
///
/// `up` is best-effort: a script that fails is reported and the sweep moves
/// on. `down` is strict: the ledger record is only removed after the
/// down-script ran successfully.
pub struct Migrator<'a> {
    store: &'a ScriptStore,
    ledger: &'a dyn MigrationLedger,
    executor: &'a dyn ScriptExecutor,
    on_progress: Option<ProgressHook<'a>>,
}

impl<'a> Migrator<'a> {
    pub fn new(
        store: &'a ScriptStore,
        ledger: &'a dyn MigrationLedger,
        executor: &'a dyn ScriptExecutor,
    ) -> Self {
        Self {
            store,
            ledger,
            executor,
            on_progress: None,
        }
    }

    /// Set a callback invoked with each script's outcome as soon as it is known.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ScriptOutcome) + 'a,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Create the ledger table if needed. Run once before any other operation.
    pub fn ensure_ledger(&self) -> Result<(), MigrationError> {
        self.ledger.ensure_schema()
    }

    /// Apply every pending up-script in ascending version order.
    ///
    /// Scripts whose version is already in the ledger are skipped without
    /// being executed. For each pending script the body is executed and then
    /// recorded; a failure in either step is captured in the report and the
    /// sweep continues with the next script. A `DuplicateVersion` from the
    /// ledger means another run recorded the version first and is reported
    /// as already applied.
    ///
    /// With `dry_run`, pending scripts are reported as
    /// [`ScriptOutcome::WouldApply`] and nothing is executed.
    ///
    /// # Errors
    ///
    /// Returns an error only when the scripts or the ledger cannot be listed.
    pub fn up(&self, dry_run: bool) -> Result<UpReport, MigrationError> {
        let scripts = self.store.list_up()?;
        let mut recorded: HashMap<String, String> = self
            .ledger
            .list_all()?
            .into_iter()
            .map(|r| (r.version, r.description))
            .collect();

        let mut report = UpReport::default();

        for script in scripts {
            let outcome = match recorded.get(&script.version) {
                Some(stored) if *stored == script.ledger_description() => {
                    log::debug!("Already applied: {}", script.path.display());
                    ScriptOutcome::AlreadyApplied(script)
                }
                Some(stored) => {
                    // Same version, different script: the ledger can hold only one.
                    log::warn!(
                        "{} shares version {} with applied migration {}",
                        script.path.display(),
                        script.version,
                        stored
                    );
                    let error = MigrationError::DuplicateVersion {
                        version: script.version.clone(),
                    };
                    ScriptOutcome::Failed { script, error }
                }
                None if dry_run => ScriptOutcome::WouldApply(script),
                None => self.apply(script),
            };

            if let ScriptOutcome::Applied(s) = &outcome {
                recorded.insert(s.version.clone(), s.ledger_description());
            }
            if let Some(hook) = &self.on_progress {
                hook(&outcome);
            }
            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    fn apply(&self, script: MigrationScript) -> ScriptOutcome {
        let description = script.ledger_description();

        // Reject what the ledger could not store before touching the schema.
        // Column widths count characters, not bytes.
        let too_long = [
            (script.version.clone(), MAX_VERSION_LEN),
            (description.clone(), MAX_DESCRIPTION_LEN),
        ]
        .into_iter()
        .find(|(value, max)| value.chars().count() > *max);

        if let Some((value, max)) = too_long {
            let error = MigrationError::LedgerFieldTooLong {
                version: script.version.clone(),
                value,
                max,
            };
            log::warn!("Skipping {}: {}", script.path.display(), error);
            return ScriptOutcome::Failed { script, error };
        }

        let body = match self.store.read_up(&script) {
            Ok(body) => body,
            Err(error) => {
                log::warn!("Skipping {}: {}", script.path.display(), error);
                return ScriptOutcome::Failed { script, error };
            }
        };

        if let Err(source) = self.executor.execute_script(&body) {
            let error = MigrationError::ScriptExecution {
                version: script.version.clone(),
                description: script.description.clone(),
                source,
            };
            log::warn!("Skipping {}: {}", script.path.display(), error);
            return ScriptOutcome::Failed { script, error };
        }

        match self.ledger.record_applied(&script.version, &description) {
            Ok(()) => {
                log::info!("Applied {}", script.path.display());
                ScriptOutcome::Applied(script)
            }
            Err(MigrationError::DuplicateVersion { .. }) => {
                log::info!("{} was recorded by another run", script.path.display());
                ScriptOutcome::AlreadyApplied(script)
            }
            Err(error) => {
                log::warn!(
                    "{} ran but could not be recorded: {}",
                    script.path.display(),
                    error
                );
                ScriptOutcome::Failed { script, error }
            }
        }
    }

    /// Revert the most recently applied migration.
    ///
    /// Looks up the latest ledger record, reads its down-script, executes it,
    /// and only then removes the record. With `dry_run`, stops after the
    /// down-script was found and read.
    ///
    /// Returns the reverted script; its [`MigrationScript::down_path`] is the
    /// file that ran.
    ///
    /// # Errors
    ///
    /// - `NoAppliedMigrations` if the ledger is empty
    /// - `MalformedScriptName` if the stored description cannot be parsed
    /// - `ScriptNotFound` if the down-script is missing
    /// - `ScriptExecution` if the down-script fails
    /// - `LedgerInconsistent` if the down-script ran but the record could not
    ///   be removed
    ///
    /// In every case but the last, the ledger is left untouched.
    pub fn down(&self, dry_run: bool) -> Result<MigrationScript, MigrationError> {
        let record = self
            .ledger
            .latest()?
            .ok_or(MigrationError::NoAppliedMigrations)?;

        let script = self.store.script_for(&record.version, &record.description)?;
        let body = self.store.read_down(&script)?;

        if dry_run {
            return Ok(script);
        }

        self.executor
            .execute_script(&body)
            .map_err(|source| MigrationError::ScriptExecution {
                version: script.version.clone(),
                description: script.description.clone(),
                source,
            })?;

        self.ledger
            .remove_applied(&script.version)
            .map_err(|e| MigrationError::LedgerInconsistent {
                version: script.version.clone(),
                source: Box::new(e),
            })?;

        log::info!("Reverted {}", script.down_path().display());
        Ok(script)
    }

    /// All ledger records, ascending by version.
    pub fn log(&self) -> Result<Vec<LedgerRecord>, MigrationError> {
        self.ledger.list_all()
    }

    /// Applied vs pending migrations.
    pub fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let scripts = self.store.list_up()?;
        let records = self.ledger.list_all()?;
        Ok(MigrationStatus::new(records, scripts))
    }
}
