//! Integration tests against a real MySQL server
//!
//! Tests that need a server start their own MySQL container, so Docker must
//! be available. They are ignored by default; run them with:
//!
//! ```text
//! cargo test -p mig-integration-tests -- --ignored
//! ```

use mig::migration::{MigrationError, MigrationLedger, Migrator, MysqlLedger, ScriptStore};
use mig::{connect, ConnectionSettings, MigConfig, MysqlExecutor, ScriptExecutor};
use mysql::prelude::Queryable;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use testcontainers::clients::Cli;
use testcontainers_modules::mysql::Mysql;

/// Database created by the MySQL module image.
const DATABASE: &str = "test";

fn config_for(port: u16, migrations_dir: &Path) -> MigConfig {
    MigConfig {
        db_host: "127.0.0.1".to_string(),
        db_port: port,
        db_name: DATABASE.to_string(),
        migrations_dir: migrations_dir.to_path_buf(),
        ..MigConfig::default()
    }
}

fn executor_for(config: &MigConfig) -> MysqlExecutor {
    let conn = connect(&ConnectionSettings::from_config(config)).unwrap();
    MysqlExecutor::new(conn)
}

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

fn table_exists(executor: &MysqlExecutor, table: &str) -> bool {
    let count: Option<u64> = executor
        .conn()
        .unwrap()
        .exec_first(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ?",
            (table,),
        )
        .unwrap();
    count == Some(1)
}

#[test]
#[ignore = "requires Docker"]
fn test_up_log_down_against_mysql() {
    let docker = Cli::default();
    let node = docker.run(Mysql::default());
    let port = node.get_host_port_ipv4(3306);

    let temp_dir = TempDir::new().unwrap();
    let config = config_for(port, temp_dir.path());
    write(
        temp_dir.path(),
        "20240101-000000_init.up.sql",
        "USE test;\nCREATE TABLE widgets (id INT PRIMARY KEY);\nINSERT INTO widgets VALUES (1);\n",
    );
    write(
        temp_dir.path(),
        "20240101-000000_init.down.sql",
        "USE test;\nDROP TABLE widgets;\n",
    );

    let executor = executor_for(&config);
    let ledger = MysqlLedger::new(&executor, &config.ledger_table);
    let store = ScriptStore::from_config(&config);
    let migrator = Migrator::new(&store, &ledger, &executor);
    migrator.ensure_ledger().unwrap();
    // Creating the ledger table is idempotent.
    migrator.ensure_ledger().unwrap();

    let report = migrator.up(false).unwrap();
    assert_eq!(report.applied_count(), 1);
    assert_eq!(report.failed_count(), 0);
    assert!(table_exists(&executor, "widgets"));

    let records = migrator.log().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].log_line(), "20240101-000000 init.up.sql");

    // A second sweep runs nothing.
    let report = migrator.up(false).unwrap();
    assert_eq!(report.applied_count(), 0);

    let reverted = migrator.down(false).unwrap();
    assert_eq!(reverted.version, "20240101-000000");
    assert!(!table_exists(&executor, "widgets"));
    assert!(migrator.log().unwrap().is_empty());

    assert!(matches!(
        migrator.down(false),
        Err(MigrationError::NoAppliedMigrations)
    ));
}

#[test]
#[ignore = "requires Docker"]
fn test_failed_script_is_not_recorded_and_sweep_continues() {
    let docker = Cli::default();
    let node = docker.run(Mysql::default());
    let port = node.get_host_port_ipv4(3306);

    let temp_dir = TempDir::new().unwrap();
    let config = config_for(port, temp_dir.path());
    write(
        temp_dir.path(),
        "20240101-000000_broken.up.sql",
        "USE test;\nCREATE TABLE broken (id INT PRIMARY KEY;\n",
    );
    write(
        temp_dir.path(),
        "20240102-000000_fine.up.sql",
        "USE test;\nCREATE TABLE fine (id INT PRIMARY KEY);\n",
    );

    let executor = executor_for(&config);
    let ledger = MysqlLedger::new(&executor, &config.ledger_table);
    let store = ScriptStore::from_config(&config);
    let migrator = Migrator::new(&store, &ledger, &executor);
    migrator.ensure_ledger().unwrap();

    let report = migrator.up(false).unwrap();

    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.applied_count(), 1);
    let versions: Vec<String> = ledger
        .list_all()
        .unwrap()
        .into_iter()
        .map(|r| r.version)
        .collect();
    assert_eq!(versions, vec!["20240102-000000".to_string()]);
}

#[test]
#[ignore = "requires Docker"]
fn test_failing_down_script_keeps_ledger_record() {
    let docker = Cli::default();
    let node = docker.run(Mysql::default());
    let port = node.get_host_port_ipv4(3306);

    let temp_dir = TempDir::new().unwrap();
    let config = config_for(port, temp_dir.path());
    write(
        temp_dir.path(),
        "20240101-000000_init.up.sql",
        "USE test;\nCREATE TABLE widgets (id INT PRIMARY KEY);\n",
    );
    write(
        temp_dir.path(),
        "20240101-000000_init.down.sql",
        "USE test;\nDROP TABLE no_such_table;\n",
    );

    let executor = executor_for(&config);
    let ledger = MysqlLedger::new(&executor, &config.ledger_table);
    let store = ScriptStore::from_config(&config);
    let migrator = Migrator::new(&store, &ledger, &executor);
    migrator.ensure_ledger().unwrap();
    assert_eq!(migrator.up(false).unwrap().applied_count(), 1);

    let err = migrator.down(false).unwrap_err();

    assert!(matches!(err, MigrationError::ScriptExecution { .. }));
    assert_eq!(ledger.list_all().unwrap().len(), 1);
    assert!(table_exists(&executor, "widgets"));
}

#[test]
#[ignore = "requires Docker"]
fn test_error_in_later_statement_fails_the_script() {
    let docker = Cli::default();
    let node = docker.run(Mysql::default());
    let port = node.get_host_port_ipv4(3306);

    let temp_dir = TempDir::new().unwrap();
    let config = config_for(port, temp_dir.path());
    let executor = executor_for(&config);

    let err = executor
        .execute_script("USE test;\nSELECT 1;\nSELECT * FROM no_such_table;\n")
        .unwrap_err();

    assert!(err.to_string().contains("no_such_table"));
    // The connection is still usable afterwards.
    executor.execute_script("SELECT 1;").unwrap();
}

#[test]
#[ignore = "requires Docker"]
fn test_ledger_rejects_duplicate_version() {
    let docker = Cli::default();
    let node = docker.run(Mysql::default());
    let port = node.get_host_port_ipv4(3306);

    let temp_dir = TempDir::new().unwrap();
    let config = config_for(port, temp_dir.path());
    let executor = executor_for(&config);
    let ledger = MysqlLedger::new(&executor, &config.ledger_table);
    ledger.ensure_schema().unwrap();

    ledger
        .record_applied("20240101-000000", "it's.up.sql")
        .unwrap();
    let err = ledger
        .record_applied("20240101-000000", "other.up.sql")
        .unwrap_err();

    assert!(matches!(err, MigrationError::DuplicateVersion { .. }));
    let latest = ledger.latest().unwrap().unwrap();
    assert_eq!(latest.description, "it's.up.sql");

    ledger.remove_applied("20240101-000000").unwrap();
    assert!(matches!(
        ledger.remove_applied("20240101-000000"),
        Err(MigrationError::AppliedRecordMissing { .. })
    ));
}

#[test]
fn test_unreachable_server_is_a_connection_error() {
    let config = MigConfig {
        db_host: "127.0.0.1".to_string(),
        // Nothing listens here.
        db_port: 1,
        ..MigConfig::default()
    };

    let err = connect(&ConnectionSettings::from_config(&config)).unwrap_err();

    assert!(err.to_string().contains("root@tcp(127.0.0.1:1)/bte"));
}
