//! The finitd configuration tree (spec.md §3).
//!
//! Unlike the original Python implementation's reflective `hieropt` tree,
//! this is a flat set of structs populated once by [`crate::config::load`].

use nix::sys::signal::Signal;
use nix::unistd::{Gid, Uid};
use std::collections::BTreeMap;

/// `finitd.child.*` — how the supervised program is launched.
#[derive(Clone, Debug)]
pub struct ChildConfig {
    /// Shell command line, parsed by `/bin/sh -c`. Required.
    pub command: String,
    pub stdin: String,
    pub stdout: String,
    pub stderr: String,
    pub chdir: String,
    pub chroot: bool,
    pub umask: u32,
    pub setuid: Option<Uid>,
    pub setgid: Option<Gid>,
}

impl Default for ChildConfig {
    fn default() -> Self {
        ChildConfig {
            command: String::new(),
            stdin: "/dev/null".to_string(),
            stdout: "/dev/null".to_string(),
            stderr: "/dev/null".to_string(),
            chdir: "/".to_string(),
            chroot: false,
            umask: 0,
            setuid: None,
            setgid: None,
        }
    }
}

/// `finitd.commands.stop.*`.
///
/// `signal` is `None` until the config file sets it explicitly, so
/// `commands::stop`'s "command and signal cannot both be configured" check
/// (spec.md §4.5) can tell "unset" from "set to its eventual default".
#[derive(Clone, Debug, Default)]
pub struct StopConfig {
    /// Mutually exclusive with `signal`.
    pub command: Option<String>,
    pub signal: Option<Signal>,
}

impl StopConfig {
    /// The signal actually sent when `command` is unset: whatever was
    /// configured, or `SIGTERM` otherwise.
    pub fn effective_signal(&self) -> Signal {
        self.signal.unwrap_or(Signal::SIGTERM)
    }
}

/// One `finitd.commands.arbitrary.<name>` entry.
#[derive(Clone, Debug, Default)]
pub struct ArbitraryConfig {
    pub command: String,
    pub help: String,
}

/// `finitd.commands.*`.
#[derive(Clone, Debug, Default)]
pub struct CommandsConfig {
    pub stop: StopConfig,
    pub arbitrary: BTreeMap<String, ArbitraryConfig>,
}

/// `finitd.options.*`.
#[derive(Clone, Debug)]
pub struct OptionsConfig {
    pub pidfile: Option<String>,
    pub clearenv: bool,
    pub envdir: Option<String>,
    pub restart_wait_time: u64,
    pub kill_wait_time: u64,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        OptionsConfig {
            pidfile: None,
            clearenv: false,
            envdir: None,
            restart_wait_time: 10,
            kill_wait_time: 60,
        }
    }
}

/// `finitd.watcher.restart.*`.
#[derive(Clone, Debug)]
pub struct RestartPolicy {
    pub enabled: bool,
    pub wait: u64,
    pub command: Option<String>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy {
            enabled: false,
            wait: 60,
            command: None,
        }
    }
}

/// `finitd.watcher.*`.
#[derive(Clone, Debug)]
pub struct WatcherConfig {
    pub wait: bool,
    /// Default is `<options.pidfile>.watcher`, resolved by [`Config::resolve_watcher_pidfile`]
    /// once `options.pidfile` is known (the original's `default=lambda: ...`
    /// has the same dependency, which its own test suite has to work around).
    pub pidfile: Option<String>,
    pub restart: RestartPolicy,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            wait: true,
            pidfile: None,
            restart: RestartPolicy::default(),
        }
    }
}

/// The full configuration tree for one invocation.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub child: ChildConfig,
    pub commands: CommandsConfig,
    pub env: BTreeMap<String, String>,
    pub options: OptionsConfig,
    pub watcher: WatcherConfig,
}

impl Config {
    /// Resolve `watcher.pidfile`'s default against the already-loaded
    /// `options.pidfile`, mirroring the original's `default=lambda: ...`.
    pub fn resolve_watcher_pidfile(&mut self) {
        if self.watcher.pidfile.is_none()
            && let Some(pidfile) = &self.options.pidfile
        {
            self.watcher.pidfile = Some(format!("{pidfile}.watcher"));
        }
    }
}
