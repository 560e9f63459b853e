//! finitd: a small process supervisor. Entry point wiring argument
//! parsing, configuration loading, and command dispatch together.
//! Grounded in `original_source/finitd/main.py::main`.

mod args;
mod commands;
mod config;
mod constants;
mod daemon;
mod dispatch;
mod env;
mod error;
mod launch;
mod logging;
mod model;
mod process;
mod watcher;

use crate::constants::PROGRAM;
use std::process::exit;

fn main() {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let invocation = match args::parse(&argv) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("{message}");
            exit(2);
        }
    };

    let config = match config::load(&invocation.config_file) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Could not open configuration file {:?}: {err}", invocation.config_file);
            exit(err.exit_code());
        }
    };

    let table = dispatch::command_table(&config);

    let absolute_config_file = if invocation.config_file.starts_with('/') {
        invocation.config_file.clone()
    } else {
        std::env::current_dir()
            .map(|dir| dir.join(&invocation.config_file).to_string_lossy().into_owned())
            .unwrap_or_else(|_| invocation.config_file.clone())
    };
    logging::open(&format!("{PROGRAM} {absolute_config_file}"));

    if let Err(err) = dispatch::dispatch(&invocation, &config, &table) {
        if matches!(&err, error::FinitdError::InvalidConfiguration(reason) if reason.starts_with("Invalid command"))
        {
            eprintln!("{}", dispatch::help_text(&table, &invocation.config_file));
        }
        eprintln!("{err}");
        exit(err.exit_code());
    }
}
