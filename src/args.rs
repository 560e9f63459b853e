//! Command-line argument parsing for finitd (C7, spec.md §4.7/§6):
//! `finitd <configfile> [options] <command> [args...]`.
//!
//! Grounded in the teacher's own hand-rolled `args.rs`, and in the grammar
//! `original_source/finitd/main.py::main` implements on top of `optparse`
//! (config file must come first, before any flags).

use crate::constants::PROGRAM;

/// A parsed invocation: which config file to load, which command to run,
/// and any trailing arguments for that command.
#[derive(Debug, PartialEq, Eq)]
pub struct Invocation {
    pub config_file: String,
    pub command: String,
    pub args: Vec<String>,
}

/// Render the top-level usage line (spec.md §6). Per-command help is
/// appended by `dispatch::help_text`, once the config file (and therefore
/// `commands.arbitrary.*`) is known.
pub fn usage() -> String {
    format!("usage: {PROGRAM} <configfile> [options] <command> [args...]")
}

/// Parse a full argv (excluding argv[0]). The config file must be the
/// first token and must not look like a flag; everything after the first
/// non-flag token following it is the command name and its arguments.
pub fn parse(argv: &[String]) -> Result<Invocation, String> {
    let config_file = match argv.first() {
        Some(first) if !first.starts_with('-') => first.clone(),
        _ => return Err(format!("A configuration file must be provided.\n{}", usage())),
    };

    let rest = &argv[1..];
    let command_pos = rest.iter().position(|a| !a.starts_with('-'));
    let command = match command_pos.and_then(|i| rest.get(i)) {
        Some(cmd) => cmd.clone(),
        None => return Err(format!("A command must be provided.\n{}", usage())),
    };
    let args = rest[command_pos.unwrap() + 1..].to_vec();

    Ok(Invocation {
        config_file,
        command,
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::parse;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_configfile_then_command() {
        let inv = parse(&argv(&["/etc/finitd/foo.conf", "start"])).unwrap();
        assert_eq!(inv.config_file, "/etc/finitd/foo.conf");
        assert_eq!(inv.command, "start");
        assert!(inv.args.is_empty());
    }

    #[test]
    fn parses_trailing_args_for_arbitrary_commands() {
        let inv = parse(&argv(&["foo.conf", "reload", "--force"])).unwrap();
        assert_eq!(inv.command, "reload");
        assert_eq!(inv.args, vec!["--force".to_string()]);
    }

    #[test]
    fn rejects_missing_configfile() {
        assert!(parse(&argv(&["-h"])).is_err());
        assert!(parse(&argv(&[])).is_err());
    }

    #[test]
    fn rejects_missing_command() {
        assert!(parse(&argv(&["foo.conf"])).is_err());
    }
}
