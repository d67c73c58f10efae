//! des-cli: binary entry point for the discrete-event simulator.
//!
//! Loads the two YAML configs, hands them to `des-orchestrator::run`, and
//! prints the metrics report as JSON. Fatal failures are reported as the
//! structured `{ok: false, reason, where}` record `spec.md` §7 requires
//! instead of a panic or an uncaught error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;

/// Run a configuration-driven discrete-event simulation and print its
/// metrics report.
#[derive(Debug, Parser)]
#[command(name = "des-cli", version, about)]
struct Cli {
    /// Path to the database schema config YAML.
    #[arg(long = "db-config")]
    db_config: PathBuf,

    /// Path to the simulation config YAML.
    #[arg(long = "sim-config")]
    sim_config: PathBuf,

    /// Pretty-print the metrics JSON instead of compact single-line output.
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Serialize)]
struct FailureReport<'a> {
    ok: bool,
    reason: String,
    #[serde(rename = "where")]
    location: &'a str,
}

fn fail(reason: impl ToString, location: &str) -> ExitCode {
    let report = FailureReport {
        ok: false,
        reason: reason.to_string(),
        location,
    };
    match serde_json::to_string(&report) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("{{\"ok\":false,\"reason\":\"{}\",\"where\":\"{}\"}}", reason.to_string(), location),
    }
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    env_logger::init();
    des_persistence::init_dotenv();

    let cli = Cli::parse();

    let db_yaml = match std::fs::read_to_string(&cli.db_config) {
        Ok(s) => s,
        Err(e) => return fail(e, "reading database config file"),
    };
    let sim_yaml = match std::fs::read_to_string(&cli.sim_config) {
        Ok(s) => s,
        Err(e) => return fail(e, "reading simulation config file"),
    };

    let db_config = match des_domain::load_database_config(&db_yaml) {
        Ok(c) => c,
        Err(e) => return fail(e, "parsing database config"),
    };
    let sim_config = match des_domain::load_simulation_config(&sim_yaml) {
        Ok(c) => c,
        Err(e) => return fail(e, "parsing simulation config"),
    };

    log::info!("starting simulation '{}' against '{}'", sim_config.name, db_config.db_path);

    let metrics = match des_orchestrator::run(&db_config, &sim_config) {
        Ok(m) => m,
        Err(e) => return fail(e, "running simulation"),
    };

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&metrics)
    } else {
        serde_json::to_string(&metrics)
    };
    match rendered {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e, "serializing metrics report"),
    }
}
