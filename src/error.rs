//! The finitd error taxonomy (spec.md §7).

use std::fmt;

/// Every way a finitd command can fail, matching spec.md §7's taxonomy and,
/// where spec.md quotes one literally, its exact wording.
#[derive(Debug)]
pub enum FinitdError {
    /// A precondition failed before any side effect.
    InvalidConfiguration(String),
    /// `start` found a live child pidfile.
    AlreadyRunning { pidfile: String, pid: i32 },
    /// `stop`/`status` found no live process.
    NotRunning,
    /// Unreadable pidfile/config, or a failed chdir/chroot/open.
    Filesystem { path: String, source: std::io::Error },
    /// setuid/setgid requested by a non-root caller.
    Privilege(String),
    /// Still alive after SIGKILL and the grace period.
    KillFailure { pid: i32 },
    /// `watcher.restart.command` exited non-zero.
    RestartHookFailure { status: i32 },
}

impl fmt::Display for FinitdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinitdError::InvalidConfiguration(reason) => {
                write!(f, "Invalid configuration: {reason}")
            }
            FinitdError::AlreadyRunning { pidfile, pid } => write!(
                f,
                "Process appears to be alive at pid {pid}. If this is not the process \
                 you're attempting to start, remove the pidfile {pidfile:?} and start again."
            ),
            FinitdError::NotRunning => write!(f, "Process is not running."),
            FinitdError::Filesystem { path, source } => {
                write!(f, "{path}: {source}")
            }
            FinitdError::Privilege(reason) => write!(f, "Invalid configuration: {reason}"),
            FinitdError::KillFailure { pid } => write!(f, "Cannot kill process {pid}"),
            FinitdError::RestartHookFailure { status } => write!(
                f,
                "restart hook exited with nonzero status {status}, not restarting"
            ),
        }
    }
}

impl std::error::Error for FinitdError {}

impl FinitdError {
    /// The process exit code spec.md §6 assigns to this failure: 1 for
    /// `status`/`stop` finding no process or `start` finding one already
    /// running, and "negative (non-zero)" for every configuration or
    /// runtime error. `-1` matches the original's `util.error(msg, code=-1)`
    /// default, which the shell sees as exit status 255.
    pub fn exit_code(&self) -> i32 {
        match self {
            FinitdError::AlreadyRunning { .. } | FinitdError::NotRunning => 1,
            FinitdError::InvalidConfiguration(_)
            | FinitdError::Filesystem { .. }
            | FinitdError::Privilege(_)
            | FinitdError::KillFailure { .. }
            | FinitdError::RestartHookFailure { .. } => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FinitdError;

    #[test]
    fn not_running_message_matches_spec_wording() {
        assert_eq!(FinitdError::NotRunning.to_string(), "Process is not running.");
        assert_eq!(FinitdError::NotRunning.exit_code(), 1);
    }

    #[test]
    fn kill_failure_message_matches_spec_wording() {
        let err = FinitdError::KillFailure { pid: 4242 };
        assert_eq!(err.to_string(), "Cannot kill process 4242");
        assert_eq!(err.exit_code(), -1);
    }

    #[test]
    fn restart_hook_failure_reports_negative_exit_code() {
        let err = FinitdError::RestartHookFailure { status: 7 };
        assert_eq!(err.exit_code(), -1);
    }

    #[test]
    fn already_running_names_the_pidfile() {
        let err = FinitdError::AlreadyRunning {
            pidfile: "/tmp/x.pid".to_string(),
            pid: 99,
        };
        assert!(err.to_string().contains("/tmp/x.pid"));
        assert_eq!(err.exit_code(), 1);
    }
}
