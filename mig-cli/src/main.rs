//! mig - timestamp-versioned SQL migrations for MySQL
//!
//! Reads its settings from `config/mig.toml`, a `.env` file and the process
//! environment (DBHOST, DBPORT, DBUSER, DBPASS, DBNAME, MIGDIR, MIGTAB).

use clap::Parser;
use mig_cli::Cli;
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    dotenv::dotenv().ok();

    let default_filter = mig_cli::default_log_filter(cli.verbose, cli.quiet);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match mig_cli::run(cli, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = writeln!(out, "Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
