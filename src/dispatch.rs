//! Command table and dispatch (C7, spec.md §4.7/§6): resolves a command
//! name against the built-ins plus the config file's
//! `commands.arbitrary.*` entries, renders help text, and runs the chosen
//! command. Grounded in `original_source/finitd/main.py::main`/`makeHelp`.

use crate::args::Invocation;
use crate::commands::{Arbitrary, Command, builtins};
use crate::constants::PROGRAM;
use crate::env;
use crate::error::FinitdError;
use crate::model::Config;

/// The full set of runnable commands for one config file: the seven
/// built-ins plus one [`Arbitrary`] per `commands.arbitrary.<name>` entry.
pub fn command_table(config: &Config) -> Vec<Box<dyn Command>> {
    let mut table = builtins();
    for (name, arbitrary) in &config.commands.arbitrary {
        table.push(Box::new(Arbitrary {
            name: name.clone(),
            command: arbitrary.command.clone(),
            help: arbitrary.help.clone(),
        }));
    }
    table
}

/// Render the usage/help text listing every command in `table`, in the
/// style of the original's `makeHelp`: one paragraph per command, headed by
/// `<program> <configfile> <command>`.
pub fn help_text(table: &[Box<dyn Command>], config_file: &str) -> String {
    let names: Vec<&str> = table.iter().map(|c| c.name()).collect();
    let mut out = format!(
        "usage: {PROGRAM} {config_file} [options] {{{}}} [args...]\n\nCommands:\n",
        names.join("|")
    );
    for command in table {
        out.push_str(&format!("{PROGRAM} {config_file} {}\n", command.name()));
        for line in wrap(&command.help(), 64) {
            out.push_str("\t\t\t");
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// Minimal word-wrap, good enough for the short, single-sentence help
/// strings every command supplies.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Resolve `invocation.command` against `table`, check its configuration,
/// build the environment, and run it.
pub fn dispatch(invocation: &Invocation, config: &Config, table: &[Box<dyn Command>]) -> Result<(), FinitdError> {
    let command = table
        .iter()
        .find(|c| c.name() == invocation.command)
        .ok_or_else(|| {
            FinitdError::InvalidConfiguration(format!("Invalid command: {:?}", invocation.command))
        })?;

    command.check_config(config)?;
    let environ = env::build(config);
    command.run(config, &environ, &invocation.args)
}
