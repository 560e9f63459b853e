//! Process primitives (C1, spec.md §4.1): liveness probing and pidfile
//! bookkeeping. Grounded in teacher `process.rs`'s `write_pidfile`/
//! `read_pid_from_file` plus `original_source/finitd/util.py`'s
//! `checkProcessAlive`/`getPidFromFile`.

use crate::error::FinitdError;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs::{self, File};
use std::io::{Read, Write};

/// Send signal 0 to `pid` and report whether it still exists.
///
/// Returns `pid` on success. Returns `0` only when the kernel reports
/// `ESRCH` ("no such process"). Any other error — notably `EPERM`, a
/// process owned by another user — is treated as alive: a running process
/// we cannot signal still blocks `start` (spec.md §4.1, open question in
/// §9). This is deliberately not refined to cross-check start time or
/// owner identity; spec.md allows that refinement but does not require it.
pub fn check_alive(pid: Pid) -> Pid {
    match kill(pid, None) {
        Ok(()) => pid,
        Err(Errno::ESRCH) => Pid::from_raw(0),
        Err(_) => pid,
    }
}

/// Read the pid recorded in `path`.
///
/// Returns `Ok(None)` if the file does not exist. Fails with
/// [`FinitdError::Filesystem`] if it exists but cannot be opened or its
/// contents aren't a decimal integer.
pub fn read_pidfile(path: &str) -> Result<Option<Pid>, FinitdError> {
    if !std::path::Path::new(path).exists() {
        return Ok(None);
    }
    let mut buf = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut buf))
        .map_err(|source| FinitdError::Filesystem {
            path: path.to_string(),
            source,
        })?;
    let raw: i32 = buf.trim().parse().map_err(|_| FinitdError::Filesystem {
        path: path.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, "pidfile is not a pid"),
    })?;
    Ok(Some(Pid::from_raw(raw)))
}

/// Truncating write of `"<pid>\n"`. Durability beyond one `write()` is not
/// required (spec.md §4.1).
pub fn write_pidfile(pid: Pid, path: &str) -> Result<(), FinitdError> {
    let mut file = File::create(path).map_err(|source| FinitdError::Filesystem {
        path: path.to_string(),
        source,
    })?;
    writeln!(file, "{pid}").map_err(|source| FinitdError::Filesystem {
        path: path.to_string(),
        source,
    })
}

/// Unlink `path`. Absence after the call is the only postcondition; a
/// missing file is not an error (spec.md §4.1).
pub fn remove_pidfile(path: &str) {
    let _ = fs::remove_file(path);
}

#[cfg(test)]
mod tests {
    use super::{check_alive, read_pidfile, remove_pidfile, write_pidfile};
    use nix::unistd::Pid;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(tag: &str) -> std::path::PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("finitd_test_{tag}_{now}.pid"))
    }

    #[test]
    fn write_then_read_roundtrips() {
        let path = temp_path("roundtrip");
        let path_str = path.to_str().unwrap();
        write_pidfile(Pid::from_raw(4242), path_str).unwrap();
        assert_eq!(read_pidfile(path_str).unwrap(), Some(Pid::from_raw(4242)));
        remove_pidfile(path_str);
        assert_eq!(read_pidfile(path_str).unwrap(), None);
    }

    #[test]
    fn remove_pidfile_is_idempotent() {
        let path = temp_path("idempotent");
        remove_pidfile(path.to_str().unwrap());
        remove_pidfile(path.to_str().unwrap());
    }

    #[test]
    fn check_alive_self_returns_own_pid() {
        let me = Pid::this();
        assert_eq!(check_alive(me), me);
    }

    #[test]
    fn check_alive_dead_pid_returns_zero() {
        // PID 1 always exists on a real system but an arbitrarily high,
        // almost-certainly-unused pid should report ESRCH.
        let probably_dead = Pid::from_raw(i32::MAX - 2);
        assert_eq!(check_alive(probably_dead), Pid::from_raw(0));
    }
}
