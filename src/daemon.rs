//! Daemonizer (C3, spec.md §4.3): fork-to-background, new session,
//! close-all-fds, open the configured stdin/stdout/stderr. Grounded in
//! teacher `process.rs::daemonize`'s fork/setsid/dup2 shape, extended to
//! the full 8-step sequence spec.md requires instead of the teacher's
//! fixed two-fd `/dev/null` redirect.

use crate::constants::FALLBACK_MAX_FD;
use crate::error::FinitdError;
use crate::launch::chdir_and_maybe_chroot;
use crate::model::ChildConfig;
use nix::fcntl::{OFlag, open};
use nix::sys::stat::Mode;
use nix::unistd::{ForkResult, close, dup2, fork, setsid};
use std::os::fd::RawFd;
use std::process;

/// Outcome of [`daemonize`] in the parent process: the caller (`start`)
/// should exit immediately with status 0, matching spec.md §4.3 step 2.
pub struct ParentShouldExit;

/// Run steps 2–8 of spec.md §4.3. The caller is responsible for step 1
/// (rebinding its own stdout/stderr to a syslog sink) before calling this,
/// since that step only matters to the parent/watcher's own logging and
/// has nothing to do with process forking.
///
/// Returns `Ok(Some(ParentShouldExit))` in the parent branch, `Ok(None)` in
/// the child branch (now the Watcher) after fds 0/1/2 are rebound.
pub fn daemonize(child: &ChildConfig) -> Result<Option<ParentShouldExit>, FinitdError> {
    match unsafe { fork() }.map_err(fork_error)? {
        ForkResult::Parent { .. } => return Ok(Some(ParentShouldExit)),
        ForkResult::Child => {}
    }

    setsid().map_err(|source| FinitdError::Filesystem {
        path: "setsid".to_string(),
        source: std::io::Error::from(source),
    })?;

    chdir_and_maybe_chroot(child)?;

    close_all_fds();
    open_child_stdio(child)?;

    Ok(None)
}

fn fork_error(source: nix::errno::Errno) -> FinitdError {
    FinitdError::Filesystem {
        path: "fork".to_string(),
        source: std::io::Error::from(source),
    }
}

/// Close every fd up to the OS-reported maximum, falling back to 256 when
/// `sysconf(_SC_OPEN_MAX)` is unavailable (spec.md §4.3 step 5).
fn close_all_fds() {
    let max_fd = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let max_fd = if max_fd > 0 { max_fd as RawFd } else { FALLBACK_MAX_FD };
    for fd in 0..max_fd {
        let _ = close(fd);
    }
}

/// Open `child.stdin`/`stdout`/`stderr` as fds 0/1/2, asserting they landed
/// exactly there (spec.md §4.3 steps 6–8). This runs immediately after
/// [`close_all_fds`], so the first three `open()` calls are guaranteed the
/// lowest available fd numbers.
fn open_child_stdio(child: &ChildConfig) -> Result<(), FinitdError> {
    let stdin_fd = open_for(&child.stdin, OFlag::O_CREAT | OFlag::O_RDONLY)?;
    assert_fd(stdin_fd, 0, &child.stdin)?;

    let stdout_fd = open_for(&child.stdout, OFlag::O_CREAT | OFlag::O_WRONLY)?;
    assert_fd(stdout_fd, 1, &child.stdout)?;

    if child.stderr != child.stdout {
        let stderr_fd = open_for(&child.stderr, OFlag::O_CREAT | OFlag::O_WRONLY)?;
        assert_fd(stderr_fd, 2, &child.stderr)?;
    } else {
        dup2(1, 2).map_err(|source| FinitdError::Filesystem {
            path: child.stderr.clone(),
            source: std::io::Error::from(source),
        })?;
    }
    Ok(())
}

fn open_for(path: &str, flags: OFlag) -> Result<RawFd, FinitdError> {
    open(path, flags, Mode::from_bits_truncate(0o644)).map_err(|source| FinitdError::Filesystem {
        path: path.to_string(),
        source: std::io::Error::from(source),
    })
}

fn assert_fd(got: RawFd, want: RawFd, path: &str) -> Result<(), FinitdError> {
    if got == want {
        Ok(())
    } else {
        Err(FinitdError::Filesystem {
            path: path.to_string(),
            source: std::io::Error::other(format!(
                "expected fd {want} after close-all-fds, got {got}"
            )),
        })
    }
}

/// Exit the parent after [`daemonize`] reports [`ParentShouldExit`].
pub fn exit_parent() -> ! {
    process::exit(0)
}

#[cfg(test)]
mod tests {
    use super::{open_for, FinitdError};
    use nix::fcntl::OFlag;

    #[test]
    fn open_for_missing_directory_is_filesystem_error() {
        let err = open_for("/nonexistent-finitd-test-dir/x", OFlag::O_RDONLY);
        assert!(matches!(err, Err(FinitdError::Filesystem { .. })));
    }
}
