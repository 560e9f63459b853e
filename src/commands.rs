//! The commands finitd dispatches to (C5, spec.md §4.5): `start`, `debug`,
//! `stop`, `restart`, `kill`, `status`, `annotate`, and any
//! `commands.arbitrary.*` the config file declares. Grounded in
//! `original_source/finitd/commands.py`'s `Command` subclasses.

use crate::daemon::{self, ParentShouldExit};
use crate::error::FinitdError;
use crate::launch;
use crate::model::Config;
use crate::process::{check_alive, read_pidfile};
use crate::watcher;
use nix::sys::signal::{Signal, kill};
use nix::unistd::{Pid, getuid};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::process::Command as ShellCommand;
use std::thread;
use std::time::{Duration, Instant};

/// One dispatchable finitd command.
pub trait Command {
    fn name(&self) -> &str;
    fn help(&self) -> String;

    /// Validate `config` before any side effect. The default accepts
    /// anything, matching the original's `Command.checkConfig` no-op.
    fn check_config(&self, _config: &Config) -> Result<(), FinitdError> {
        Ok(())
    }

    fn run(&self, config: &Config, env: &HashMap<String, String>, args: &[String]) -> Result<(), FinitdError>;
}

/// Read `config.options.pidfile`, erroring the way every command that
/// needs it does when it's unset.
fn require_pidfile(config: &Config) -> Result<&str, FinitdError> {
    config.options.pidfile.as_deref().ok_or_else(|| {
        FinitdError::InvalidConfiguration("finitd.options.pidfile must be configured.".to_string())
    })
}

/// The pid recorded in `pidfile`, or `0` if the file is absent or names a
/// process that's no longer alive.
fn alive_pid(pidfile: &str) -> Result<Pid, FinitdError> {
    match read_pidfile(pidfile)? {
        Some(pid) => Ok(check_alive(pid)),
        None => Ok(Pid::from_raw(0)),
    }
}

fn signal_error(pid: Pid, source: nix::errno::Errno) -> FinitdError {
    FinitdError::Filesystem {
        path: format!("kill({pid})"),
        source: io::Error::from(source),
    }
}

pub struct Start;

impl Command for Start {
    fn name(&self) -> &str {
        "start"
    }

    fn help(&self) -> String {
        "Starts the configured child process.".to_string()
    }

    fn check_config(&self, config: &Config) -> Result<(), FinitdError> {
        if config.options.pidfile.is_none() {
            return Err(FinitdError::InvalidConfiguration(
                "finitd.options.pidfile must be configured.".to_string(),
            ));
        }
        if config.watcher.restart.enabled && !config.watcher.wait {
            return Err(FinitdError::InvalidConfiguration(
                "finitd.watcher.wait must be set if finitd.watcher.restart is set.".to_string(),
            ));
        }
        if config.child.setuid.is_some() && !getuid().is_root() {
            return Err(FinitdError::InvalidConfiguration(
                "You must be root if finitd.child.setuid is set.".to_string(),
            ));
        }
        if config.child.setgid.is_some() && !getuid().is_root() {
            return Err(FinitdError::InvalidConfiguration(
                "You must be root if finitd.child.setgid is set.".to_string(),
            ));
        }
        Ok(())
    }

    fn run(&self, config: &Config, env: &HashMap<String, String>, _args: &[String]) -> Result<(), FinitdError> {
        let pidfile = require_pidfile(config)?;
        let pid = alive_pid(pidfile)?;
        if pid.as_raw() != 0 {
            return Err(FinitdError::AlreadyRunning {
                pidfile: pidfile.to_string(),
                pid: pid.as_raw(),
            });
        }

        match daemon::daemonize(&config.child)? {
            Some(ParentShouldExit) => daemon::exit_parent(),
            None => watcher::run(config, env),
        }
    }
}

pub struct Debug;

impl Command for Debug {
    fn name(&self) -> &str {
        "debug"
    }

    fn help(&self) -> String {
        "Starts the configured child process without daemonizing or redirecting \
         stdin/stdout/stderr, for debugging problems with starting the process."
            .to_string()
    }

    fn check_config(&self, config: &Config) -> Result<(), FinitdError> {
        Start.check_config(config)
    }

    fn run(&self, config: &Config, env: &HashMap<String, String>, _args: &[String]) -> Result<(), FinitdError> {
        launch::chdir_only(&config.child)?;
        launch::maybe_chroot(&config.child)?;
        launch::apply_umask(&config.child);
        launch::drop_privileges(&config.child)?;
        Err(launch::exec_child(&config.child.command, env))
    }
}

pub struct Stop;

impl Command for Stop {
    fn name(&self) -> &str {
        "stop"
    }

    fn help(&self) -> String {
        "Stops the running child process by sending it SIGTERM.".to_string()
    }

    fn check_config(&self, config: &Config) -> Result<(), FinitdError> {
        if config.options.pidfile.is_none() {
            return Err(FinitdError::InvalidConfiguration(
                "Cannot stop the process without a configured finitd.options.pidfile.".to_string(),
            ));
        }
        if config.commands.stop.command.is_some() && config.commands.stop.signal.is_some() {
            return Err(FinitdError::InvalidConfiguration(
                "finitd.commands.stop.command and finitd.commands.stop.signal cannot be \
                 configured simultaneously."
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn run(&self, config: &Config, env: &HashMap<String, String>, _args: &[String]) -> Result<(), FinitdError> {
        // If the pidfile is a relative pathname, it's relative to here.
        launch::chdir_only(&config.child)?;

        let pidfile = require_pidfile(config)?;
        let pid = alive_pid(pidfile)?;
        if pid.as_raw() == 0 {
            return Err(FinitdError::NotRunning);
        }

        if config.watcher.restart.enabled
            && let Some(watcher_pidfile) = &config.watcher.pidfile
            && let Some(watcher_pid) = read_pidfile(watcher_pidfile)?
        {
            let _ = kill(watcher_pid, Signal::SIGUSR1);
            wait_for_watcher_exit(watcher_pidfile);
        }

        if let Some(command) = &config.commands.stop.command {
            return Err(launch::exec_via_shell(command, env));
        }

        kill(pid, config.commands.stop.effective_signal()).map_err(|source| signal_error(pid, source))
    }
}

/// Poll for the watcher's pidfile to disappear, instead of the original's
/// blind one-second sleep after sending SIGUSR1: the watcher unlinks its
/// pidfile synchronously from its signal handler, so its absence is an
/// exact, and usually much faster, readiness signal. Bounded so a watcher
/// that doesn't exit cleanly doesn't hang `stop` forever.
fn wait_for_watcher_exit(watcher_pidfile: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Path::new(watcher_pidfile).exists() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(100));
    }
}

fn wait_for(seconds: u64) {
    thread::sleep(Duration::from_secs(seconds));
}

pub struct Restart;

impl Command for Restart {
    fn name(&self) -> &str {
        "restart"
    }

    fn help(&self) -> String {
        "Restarts the process. Equivalent to `stop` followed by `start`".to_string()
    }

    fn run(&self, config: &Config, env: &HashMap<String, String>, _args: &[String]) -> Result<(), FinitdError> {
        match Stop.run(config, env, &[]) {
            Ok(()) | Err(FinitdError::NotRunning) => {}
            Err(other) => return Err(other),
        }

        wait_for(config.options.restart_wait_time);

        let pidfile = require_pidfile(config)?;
        let pid = alive_pid(pidfile)?;
        if pid.as_raw() != 0 {
            return Err(FinitdError::AlreadyRunning {
                pidfile: pidfile.to_string(),
                pid: pid.as_raw(),
            });
        }

        Start.run(config, env, &[])
    }
}

pub struct Kill;

impl Command for Kill {
    fn name(&self) -> &str {
        "kill"
    }

    fn help(&self) -> String {
        "Attempts to stop the process ordinarily, but if that fails, sends the process SIGKILL."
            .to_string()
    }

    fn run(&self, config: &Config, env: &HashMap<String, String>, _args: &[String]) -> Result<(), FinitdError> {
        match Stop.run(config, env, &[]) {
            Ok(()) | Err(FinitdError::NotRunning) => {}
            Err(other) => return Err(other),
        }

        let pidfile = require_pidfile(config)?;
        let deadline = Instant::now() + Duration::from_secs(config.options.kill_wait_time);
        while Instant::now() < deadline && alive_pid(pidfile)?.as_raw() != 0 {
            thread::sleep(Duration::from_secs(1));
        }

        let pid = alive_pid(pidfile)?;
        if pid.as_raw() != 0 {
            kill(pid, Signal::SIGKILL).map_err(|source| signal_error(pid, source))?;
            thread::sleep(Duration::from_secs(config.options.restart_wait_time));
            if alive_pid(pidfile)?.as_raw() != 0 {
                return Err(FinitdError::KillFailure { pid: pid.as_raw() });
            }
        }
        Ok(())
    }
}

pub struct Status;

impl Command for Status {
    fn name(&self) -> &str {
        "status"
    }

    fn help(&self) -> String {
        "Returns whether the process is alive or not. Prints a message and exits with error \
         status 0 if the process exists, with error status 1 if the process does not exist."
            .to_string()
    }

    fn run(&self, config: &Config, _env: &HashMap<String, String>, _args: &[String]) -> Result<(), FinitdError> {
        let pidfile = require_pidfile(config)?;
        let pid = alive_pid(pidfile)?;
        if pid.as_raw() != 0 {
            println!("Process is running at pid {pid}");
            Ok(())
        } else {
            Err(FinitdError::NotRunning)
        }
    }
}

pub struct Annotate;

impl Command for Annotate {
    fn name(&self) -> &str {
        "annotate"
    }

    fn help(&self) -> String {
        "Annotates the given configuration file and outputs it to stdout. Useful with \
         /dev/null as a configuration file just to output an annotated configuration file \
         ready for modification."
            .to_string()
    }

    fn run(&self, config: &Config, _env: &HashMap<String, String>, _args: &[String]) -> Result<(), FinitdError> {
        print!("{}", crate::config::render(config));
        Ok(())
    }
}

/// A `commands.arbitrary.<name>` entry (spec.md §4.5): runs an operator-
/// defined shell command, e.g. for a `reload` that sends a custom signal.
pub struct Arbitrary {
    pub name: String,
    pub command: String,
    pub help: String,
}

impl Command for Arbitrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn help(&self) -> String {
        self.help.clone()
    }

    fn check_config(&self, _config: &Config) -> Result<(), FinitdError> {
        if self.command.is_empty() {
            return Err(FinitdError::InvalidConfiguration(format!(
                "finitd.commands.arbitrary.{}.command must be set.",
                self.name
            )));
        }
        Ok(())
    }

    fn run(&self, config: &Config, _env: &HashMap<String, String>, _args: &[String]) -> Result<(), FinitdError> {
        launch::chdir_only(&config.child)?;
        launch::maybe_chroot(&config.child)?;
        let _ = ShellCommand::new("/bin/sh").arg("-c").arg(&self.command).status();
        Ok(())
    }
}

/// All built-in commands, in the order `dispatch::help_text` lists them.
pub fn builtins() -> Vec<Box<dyn Command>> {
    vec![
        Box::new(Start),
        Box::new(Stop),
        Box::new(Kill),
        Box::new(Restart),
        Box::new(Status),
        Box::new(Debug),
        Box::new(Annotate),
    ]
}

#[cfg(test)]
mod tests {
    use super::{Command, Start, Status, Stop};
    use crate::model::Config;
    use std::collections::HashMap;

    #[test]
    fn start_check_config_requires_pidfile() {
        let config = Config::default();
        assert!(Start.check_config(&config).is_err());
    }

    #[test]
    fn stop_check_config_rejects_command_and_signal_together() {
        let mut config = Config::default();
        config.options.pidfile = Some("/tmp/x.pid".to_string());
        config.commands.stop.command = Some("/bin/true".to_string());
        config.commands.stop.signal = Some(nix::sys::signal::Signal::SIGHUP);
        assert!(Stop.check_config(&config).is_err());
    }

    #[test]
    fn status_reports_not_running_for_missing_pidfile() {
        let mut config = Config::default();
        config.options.pidfile = Some("/nonexistent-finitd-status-test.pid".to_string());
        let err = Status.run(&config, &HashMap::new(), &[]).unwrap_err();
        assert_eq!(err.to_string(), "Process is not running.");
    }
}
