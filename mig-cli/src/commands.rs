//! Subcommand handlers.
//!
//! Everything here writes user-facing lines to the `out` writer it is given,
//! so the handlers can be driven against a buffer in tests. Errors are
//! returned to the caller; the binary alone turns them into an exit status.

use crate::{Cli, Command, DatabaseCommand, NEW_USAGE, USAGE};
use anyhow::Context;
use colored::Colorize;
use mig::migration::{MigrationLedger, Migrator, MysqlLedger, ScriptOutcome, ScriptStore};
use mig::{connect, ConnectionSettings, MigConfig, MigrationError, MysqlExecutor, ScriptExecutor};
use std::cell::RefCell;
use std::io::{self, Write};

/// Run a parsed command line.
///
/// Help, an unknown subcommand and no subcommand at all are answered without
/// reading configuration or touching the database.
pub fn run(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let command = match cli.command {
        None | Some(Command::Help) => {
            writeln!(out, "{USAGE}")?;
            return Ok(());
        }
        Some(Command::Unknown(args)) => {
            let name = args.first().map(String::as_str).unwrap_or_default();
            writeln!(out, "Unknown command: {name}")?;
            return Ok(());
        }
        Some(command) => command,
    };

    let config = MigConfig::load().context("failed to load configuration")?;
    log::debug!(
        "Using migrations in {} and ledger table {}",
        config.migrations_dir.display(),
        config.ledger_table
    );
    execute(&command, &config, out)
}

/// Execute one command against the configured database and script directory.
pub fn execute(command: &Command, config: &MigConfig, out: &mut dyn Write) -> anyhow::Result<()> {
    let store = ScriptStore::from_config(config);

    if let Command::New { description } = command {
        return new_script(&store, description.as_deref(), out);
    }

    let Some(db_command) = command.database_command() else {
        writeln!(out, "{USAGE}")?;
        return Ok(());
    };

    let settings = ConnectionSettings::from_config(config);
    let conn = connect(&settings).context("failed to connect to database")?;
    let executor = MysqlExecutor::new(conn);
    let ledger = MysqlLedger::new(&executor, &config.ledger_table);

    dispatch(db_command, &store, &ledger, &executor, out)
}

/// `new`: create an up/down pair and print both paths.
pub fn new_script(
    store: &ScriptStore,
    description: Option<&str>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let Some(description) = description.filter(|d| !d.is_empty()) else {
        writeln!(out, "{NEW_USAGE}")?;
        return Ok(());
    };

    let (up, down) = store
        .create(description)
        .with_context(|| format!("failed to create migration '{description}'"))?;

    writeln!(out, "{} {}", "Created:".green(), up.display())?;
    writeln!(out, "{} {}", "Created:".green(), down.display())?;
    Ok(())
}

/// Run a database command with an explicit ledger and executor.
///
/// Makes sure the ledger table exists first.
pub fn dispatch(
    command: DatabaseCommand,
    store: &ScriptStore,
    ledger: &dyn MigrationLedger,
    executor: &dyn ScriptExecutor,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let migrator = Migrator::new(store, ledger, executor);
    migrator
        .ensure_ledger()
        .context("failed to create ledger table")?;

    match command {
        DatabaseCommand::Up { dry_run } => handle_up(migrator, dry_run, out),
        DatabaseCommand::Down { dry_run } => handle_down(&migrator, dry_run, out),
        DatabaseCommand::Log => handle_log(&migrator, out),
        DatabaseCommand::Status => handle_status(&migrator, out),
    }
}

fn handle_up(migrator: Migrator<'_>, dry_run: bool, out: &mut dyn Write) -> anyhow::Result<()> {
    let out = RefCell::new(out);
    let write_error: RefCell<Option<io::Error>> = RefCell::new(None);

    let report = migrator
        .on_progress(|outcome| {
            if let Err(e) = print_outcome(&mut **out.borrow_mut(), outcome) {
                write_error.borrow_mut().get_or_insert(e);
            }
        })
        .up(dry_run)
        .context("failed to list migrations")?;

    if let Some(e) = write_error.into_inner() {
        return Err(e.into());
    }

    let out = out.into_inner();
    if dry_run {
        let pending = report
            .outcomes
            .iter()
            .filter(|o| matches!(o, ScriptOutcome::WouldApply(_)))
            .count();
        writeln!(out, "Would apply {pending} migration(s)")?;
    } else if report.failed_count() > 0 {
        writeln!(
            out,
            "Applied {} migration(s), {} failed",
            report.applied_count(),
            report.failed_count()
        )?;
    } else if report.applied_count() > 0 {
        writeln!(out, "Applied {} migration(s)", report.applied_count())?;
    } else {
        writeln!(out, "No migrations to apply")?;
    }
    Ok(())
}

fn print_outcome(out: &mut dyn Write, outcome: &ScriptOutcome) -> io::Result<()> {
    let path = outcome.script().path.display();
    match outcome {
        ScriptOutcome::Applied(_) => writeln!(out, "{} {}", "Running:".green(), path),
        ScriptOutcome::AlreadyApplied(_) => {
            writeln!(out, "{} {}", "Skipped (already applied):".dimmed(), path)
        }
        ScriptOutcome::WouldApply(_) => writeln!(out, "{} {}", "Would run:".yellow(), path),
        ScriptOutcome::Failed { error, .. } => {
            writeln!(out, "{} {}: {}", "Failed:".red(), path, error)
        }
    }
}

fn handle_down(migrator: &Migrator<'_>, dry_run: bool, out: &mut dyn Write) -> anyhow::Result<()> {
    match migrator.down(dry_run) {
        Ok(script) if dry_run => {
            writeln!(out, "{} {}", "Would run:".yellow(), script.down_path().display())?;
            Ok(())
        }
        Ok(script) => {
            writeln!(out, "{} {}", "Running:".green(), script.down_path().display())?;
            Ok(())
        }
        Err(MigrationError::NoAppliedMigrations) => {
            writeln!(out, "No applied migrations to revert")?;
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("down failed")),
    }
}

fn handle_log(migrator: &Migrator<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
    for record in migrator.log().context("failed to read ledger")? {
        writeln!(out, "{}", record.log_line())?;
    }
    Ok(())
}

fn handle_status(migrator: &Migrator<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
    let status = migrator.status().context("failed to read migration status")?;

    writeln!(out, "Applied migrations ({}):", status.applied_count)?;
    for record in &status.applied {
        writeln!(
            out,
            "  {} {} ({})",
            "✓".green(),
            record.log_line(),
            record.applied_at.format("%Y-%m-%d %H:%M:%S")
        )?;
    }
    for record in &status.orphaned {
        writeln!(
            out,
            "  {} {} (script missing)",
            "?".yellow(),
            record.log_line()
        )?;
    }

    writeln!(out, "Pending migrations ({}):", status.pending_count)?;
    for script in &status.pending {
        writeln!(out, "  {} {}", "-".yellow(), script.path.display())?;
    }
    for script in &status.conflicting {
        writeln!(
            out,
            "  {} {} (version already applied by another script)",
            "!".red(),
            script.path.display()
        )?;
    }

    if let Some(latest) = status.latest_applied_version() {
        writeln!(out, "Latest applied version: {latest}")?;
    }
    if let Some(next) = status.next_pending_version() {
        writeln!(out, "Next pending version: {next}")?;
    }
    Ok(())
}
