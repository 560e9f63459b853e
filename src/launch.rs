//! Child launcher (C2, spec.md §4.2): chdir → chroot → umask → setgid →
//! setuid → exec, in that exact order. Grounded in
//! `original_source/finitd/main.py`'s `Command.chdir/chroot/umask/setuid/
//! setgid/execute`.

use crate::error::FinitdError;
use crate::model::ChildConfig;
use nix::sys::stat::Mode;
use nix::unistd::{chdir, chroot, setgid, setuid};
use std::collections::HashMap;
use std::ffi::CString;
use std::path::Path;

/// Step 1: `chdir` into `child.chdir`. Used on its own by commands (like
/// `stop`) that need relative pidfile paths resolved but must not chroot.
pub fn chdir_only(child: &ChildConfig) -> Result<(), FinitdError> {
    chdir(Path::new(&child.chdir)).map_err(|source| FinitdError::Filesystem {
        path: child.chdir.clone(),
        source: std::io::Error::from(source),
    })
}

/// Step 2: `chroot` into `child.chdir`, if configured. Must run after
/// [`chdir_only`], since the chroot target is the directory just entered.
pub fn maybe_chroot(child: &ChildConfig) -> Result<(), FinitdError> {
    if child.chroot {
        chroot(Path::new(&child.chdir)).map_err(|source| FinitdError::Filesystem {
            path: child.chdir.clone(),
            source: std::io::Error::from(source),
        })?;
    }
    Ok(())
}

/// Steps 1–2 together: `chdir` then `chroot` if configured. Failure is
/// fatal for the child (spec.md §4.2 step 1).
pub fn chdir_and_maybe_chroot(child: &ChildConfig) -> Result<(), FinitdError> {
    chdir_only(child)?;
    maybe_chroot(child)
}

/// Step 3: apply the configured umask. Mirrors `os.umask` in the original;
/// `nix` treats this as infallible (it returns the previous mask).
pub fn apply_umask(child: &ChildConfig) {
    let mode = Mode::from_bits_truncate(child.umask);
    nix::sys::stat::umask(mode);
}

/// Steps 4–5: setgid, then setuid, each only if configured. Order matters —
/// dropping the group id after the user id would fail once we're no longer
/// root.
pub fn drop_privileges(child: &ChildConfig) -> Result<(), FinitdError> {
    if let Some(gid) = child.setgid {
        setgid(gid).map_err(|err| {
            FinitdError::Privilege(format!("setgid({gid}) failed: {err}"))
        })?;
    }
    if let Some(uid) = child.setuid {
        setuid(uid).map_err(|err| {
            FinitdError::Privilege(format!("setuid({uid}) failed: {err}"))
        })?;
    }
    Ok(())
}

/// Step 6: `exec /bin/sh -c "exec <command>"`, replacing the process image.
///
/// The `exec ` prefix makes the shell replace itself, so the pid recorded
/// in the pidfile ends up being the long-lived child's pid, not the
/// shell's (spec.md §4.2). On success this never returns.
pub fn exec_child(command: &str, env: &HashMap<String, String>) -> FinitdError {
    exec_via_shell(command, env)
}

/// Run an arbitrary shell command in the current process image (used by
/// `commands.stop.command` and `commands.arbitrary.*`, spec.md §4.5), with
/// the same `exec`-prefix trick as [`exec_child`].
pub fn exec_via_shell(command: &str, env: &HashMap<String, String>) -> FinitdError {
    let sh = CString::new("/bin/sh").unwrap();
    let arg0 = CString::new("sh").unwrap();
    let arg1 = CString::new("-c").unwrap();
    let arg2 = match CString::new(format!("exec {command}")) {
        Ok(s) => s,
        Err(err) => {
            return FinitdError::Filesystem {
                path: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, err),
            };
        }
    };
    let args = [sh.clone(), arg0, arg1, arg2];
    let envp: Vec<CString> = env
        .iter()
        .map(|(k, v)| CString::new(format!("{k}={v}")))
        .filter_map(Result::ok)
        .collect();

    match nix::unistd::execve(&sh, &args, &envp) {
        Ok(_) => unreachable!("execve only returns on error"),
        Err(source) => FinitdError::Filesystem {
            path: "/bin/sh".to_string(),
            source: std::io::Error::from(source),
        },
    }
}
