//! Watcher loop (C4, spec.md §4.4): fork the child, write PID files, wait,
//! apply the restart policy with backoff, and handle the SIGUSR1 shutdown
//! signal. Grounded in `original_source/finitd/main.py::start.run`; the
//! REDESIGN FLAG in spec.md §9 asks for its implicit-fallthrough control
//! flow to become an explicit state machine, which [`WatcherState`] does.

use crate::error::FinitdError;
use crate::launch::{apply_umask, drop_privileges, exec_child};
use crate::logging::WatcherLog;
use crate::model::Config;
use crate::process::{remove_pidfile, write_pidfile};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use std::collections::HashMap;
use std::ffi::CString;
use std::process::Command as StdCommand;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// States of the per-iteration watcher FSM named in spec.md §9.
#[derive(Debug, PartialEq, Eq)]
enum WatcherState {
    /// Backoff window not yet elapsed: stop supervising.
    Idle,
    /// About to fork the child.
    Spawning,
    /// Child forked; blocked in `waitpid` (or fired-and-forgotten).
    Supervising,
    /// Child exited non-zero and a restart is due, possibly after a hook.
    Cooldown,
    /// Leaving the loop for good.
    Exiting,
}

/// Path the SIGUSR1 handler unlinks. Set once, before the handler can ever
/// fire, then read-only from async-signal-safe code.
static WATCHER_PIDFILE_FOR_SIGNAL: OnceLock<Option<CString>> = OnceLock::new();

extern "C" fn handle_sigusr1(_signum: libc::c_int) {
    if let Some(Some(path)) = WATCHER_PIDFILE_FOR_SIGNAL.get() {
        unsafe {
            libc::unlink(path.as_ptr());
        }
    }
    unsafe {
        libc::_exit(0);
    }
}

/// Install the SIGUSR1 handler described in spec.md §4.4/§5: it must be
/// installed in the watcher branch, after the fork that creates the child,
/// and before the controller could possibly deliver the signal.
fn install_sigusr1_handler(watcher_pidfile: Option<&str>) -> Result<(), FinitdError> {
    let _ = WATCHER_PIDFILE_FOR_SIGNAL
        .set(watcher_pidfile.map(|p| CString::new(p).unwrap_or_else(|_| CString::new("").unwrap())));
    let action = SigAction::new(
        SigHandler::Handler(handle_sigusr1),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGUSR1, &action) }.map_err(|source| FinitdError::Filesystem {
        path: "sigaction(SIGUSR1)".to_string(),
        source: std::io::Error::from(source),
    })?;
    Ok(())
}

/// Run the watcher loop until it decides to stop supervising, then remove
/// `watcher.pidfile` and exit the process with status 0. Never returns.
///
/// The caller must have already completed daemonization (spec.md §4.3); this
/// function is steps 1–3 of spec.md §4.4 repeated until the loop guard
/// fails.
pub fn run(config: &Config, env: &HashMap<String, String>) -> ! {
    let watcher_pid = Pid::this();
    let mut log = WatcherLog::to_syslog(watcher_pid.as_raw());
    let restart_wait = Duration::from_secs(config.watcher.restart.wait);
    let pidfile = config
        .options
        .pidfile
        .clone()
        .expect("start's checkConfig guarantees options.pidfile is set");

    let mut last_restart: Option<Instant> = None;
    let mut state = WatcherState::Spawning;
    let mut exit_status = 0;

    loop {
        let now = Instant::now();
        let backoff_elapsed = match last_restart {
            None => true,
            Some(t) => now.duration_since(t) >= restart_wait,
        };
        if !backoff_elapsed {
            state = WatcherState::Idle;
            break;
        }
        last_restart = Some(now);
        state = WatcherState::Spawning;
        log.log("starting process");

        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                apply_umask(&config.child);
                if let Err(err) = drop_privileges(&config.child) {
                    log.log_err(&format!("failed to drop privileges: {err}"));
                    std::process::exit(1);
                }
                let err = exec_child(&config.child.command, env);
                log.log_err(&format!("exec failed: {err}"));
                std::process::exit(127);
            }
            Ok(ForkResult::Parent { child }) => {
                state = WatcherState::Supervising;
                if let Err(err) = install_sigusr1_handler(config.watcher.pidfile.as_deref()) {
                    log.log_err(&format!("failed to install SIGUSR1 handler: {err}"));
                }
                log.log(&format!("child process started at pid {child}"));
                if let Err(err) = write_pidfile(child, &pidfile) {
                    log.log_err(&format!("failed to write pidfile: {err}"));
                }

                if !config.watcher.wait {
                    // Fire-and-forget: operator owns cleanup of the child
                    // pidfile (spec.md §9 open question).
                    state = WatcherState::Exiting;
                    break;
                }

                if let Some(watcher_pidfile) = &config.watcher.pidfile
                    && let Err(err) = write_pidfile(watcher_pid, watcher_pidfile)
                {
                    log.log_err(&format!("failed to write watcher pidfile: {err}"));
                }

                let status = wait_for_child(child);
                log.log(&format!("process exited with status {status}"));
                remove_pidfile(&pidfile);

                if config.watcher.restart.enabled && status != 0 {
                    state = WatcherState::Cooldown;
                    if let Some(hook) = &config.watcher.restart.command {
                        log.log(&format!("running {hook:?} before restart"));
                        let hook_status = StdCommand::new("/bin/sh")
                            .arg("-c")
                            .arg(hook)
                            .status()
                            .map(|s| s.code().unwrap_or(-1))
                            .unwrap_or(-1);
                        if hook_status != 0 {
                            let err = FinitdError::RestartHookFailure { status: hook_status };
                            log.log_err(&err.to_string());
                            exit_status = err.exit_code();
                            state = WatcherState::Exiting;
                            break;
                        }
                    }
                    continue;
                }
                state = WatcherState::Exiting;
                break;
            }
            Err(err) => {
                log.log_err(&format!("couldn't fork: {err}"));
                state = WatcherState::Exiting;
                break;
            }
        }
    }

    debug_assert_eq!(state, WatcherState::Exiting);
    if let Some(watcher_pidfile) = &config.watcher.pidfile {
        remove_pidfile(watcher_pidfile);
    }
    log.log("exiting");
    std::process::exit(exit_status)
}

/// Block until `child` exits, returning a shell-style exit status (the
/// low 8 bits of the exit code, or 128+signal for a fatal signal).
fn wait_for_child(child: Pid) -> i32 {
    match waitpid(child, None) {
        Ok(WaitStatus::Exited(_, code)) => code,
        Ok(WaitStatus::Signaled(_, signal, _)) => 128 + signal as i32,
        _ => -1,
    }
}
