//! Environment construction (C6, spec.md §4.6): the variables the
//! supervised child (and `commands.stop.command`/`commands.arbitrary.*`
//! shell commands) see. Grounded in
//! `original_source/finitd/main.py::makeEnvironment`.

use crate::config::env_var_name;
use crate::model::Config;
use crate::process::{check_alive, read_pidfile};
use std::collections::HashMap;

/// Build the environment for a run: start from either an empty map or the
/// process's own environment depending on `options.clearenv`, export every
/// configured leaf as `FINITD_<PATH>`, resolve the `*_PIDFILE` → `*_PID`
/// live-pid convenience variable, then layer `options.envdir` and
/// `finitd.env.*` on top.
pub fn build(config: &Config) -> HashMap<String, String> {
    let mut environ: HashMap<String, String> = if config.options.clearenv {
        HashMap::new()
    } else {
        std::env::vars().collect()
    };

    export_config_leaves(config, &mut environ);

    if let Some(envdir) = &config.options.envdir {
        apply_envdir(envdir, &mut environ);
    }
    for (name, value) in &config.env {
        environ.insert(name.clone(), value.clone());
    }

    environ
}

/// Export every meaningfully-set leaf of `config` as `FINITD_<PATH>`, and
/// for any leaf named `pidfile`, also set the sibling `FINITD_..._PID` to
/// the pid recorded there when that pid is still alive (mirroring the
/// original's `name[:-4]` truncation of the `_PIDFILE` suffix down to
/// `_PID`).
fn export_config_leaves(config: &Config, environ: &mut HashMap<String, String>) {
    if !config.child.command.is_empty() {
        environ.insert(env_var_name("child.command"), config.child.command.clone());
    }
    environ.insert(env_var_name("child.stdin"), config.child.stdin.clone());
    environ.insert(env_var_name("child.stdout"), config.child.stdout.clone());
    environ.insert(env_var_name("child.stderr"), config.child.stderr.clone());
    environ.insert(env_var_name("child.chdir"), config.child.chdir.clone());
    environ.insert(env_var_name("child.chroot"), config.child.chroot.to_string());
    environ.insert(
        env_var_name("child.umask"),
        format!("{:04o}", config.child.umask),
    );
    if let Some(uid) = config.child.setuid {
        environ.insert(env_var_name("child.setuid"), uid.to_string());
    }
    if let Some(gid) = config.child.setgid {
        environ.insert(env_var_name("child.setgid"), gid.to_string());
    }

    if let Some(command) = &config.commands.stop.command {
        environ.insert(env_var_name("commands.stop.command"), command.clone());
    }
    if let Some(signal) = config.commands.stop.signal {
        environ.insert(env_var_name("commands.stop.signal"), format!("{signal:?}"));
    }

    export_pidfile(environ, "options.pidfile", config.options.pidfile.as_deref());
    environ.insert(
        env_var_name("options.clearenv"),
        config.options.clearenv.to_string(),
    );
    if let Some(envdir) = &config.options.envdir {
        environ.insert(env_var_name("options.envdir"), envdir.clone());
    }
    environ.insert(
        env_var_name("options.restartWaitTime"),
        config.options.restart_wait_time.to_string(),
    );
    environ.insert(
        env_var_name("options.killWaitTime"),
        config.options.kill_wait_time.to_string(),
    );

    environ.insert(env_var_name("watcher.wait"), config.watcher.wait.to_string());
    export_pidfile(environ, "watcher.pidfile", config.watcher.pidfile.as_deref());
    environ.insert(
        env_var_name("watcher.restart"),
        config.watcher.restart.enabled.to_string(),
    );
    environ.insert(
        env_var_name("watcher.restart.wait"),
        config.watcher.restart.wait.to_string(),
    );
    if let Some(command) = &config.watcher.restart.command {
        environ.insert(env_var_name("watcher.restart.command"), command.clone());
    }
}

/// Export a `pidfile`-named leaf, plus its `_PID` sibling when the file
/// exists and names a still-living process.
fn export_pidfile(environ: &mut HashMap<String, String>, path: &str, value: Option<&str>) {
    let Some(value) = value else { return };
    let name = env_var_name(path);
    environ.insert(name.clone(), value.to_string());

    if let Ok(Some(pid)) = read_pidfile(value)
        && check_alive(pid).as_raw() != 0
    {
        let pid_name = name.strip_suffix("FILE").unwrap_or(&name).to_string();
        environ.insert(pid_name, pid.to_string());
    }
}

/// Overlay one variable per file in `envdir`, named after the file and
/// containing its full contents (daemontools-style envdir, spec.md §4.6).
fn apply_envdir(envdir: &str, environ: &mut HashMap<String, String>) {
    let Ok(entries) = std::fs::read_dir(envdir) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if let Ok(value) = std::fs::read_to_string(entry.path()) {
            environ.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::build;
    use crate::model::Config;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("finitd_envdir_{tag}_{now}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn clearenv_drops_inherited_variables() {
        unsafe {
            std::env::set_var("FINITD_TEST_UNRELATED", "x");
        }
        let mut config = Config::default();
        config.options.clearenv = true;
        let environ = build(&config);
        assert!(!environ.contains_key("FINITD_TEST_UNRELATED"));
        unsafe {
            std::env::remove_var("FINITD_TEST_UNRELATED");
        }
    }

    #[test]
    fn exports_child_command_when_set() {
        let mut config = Config::default();
        config.child.command = "echo hi".to_string();
        config.options.clearenv = true;
        let environ = build(&config);
        assert_eq!(environ.get("FINITD_CHILD_COMMAND").map(String::as_str), Some("echo hi"));
    }

    #[test]
    fn envdir_entries_overlay_environment() {
        let dir = temp_dir("overlay");
        fs::write(dir.join("GREETING"), "hello").unwrap();
        let mut config = Config::default();
        config.options.clearenv = true;
        config.options.envdir = Some(dir.to_str().unwrap().to_string());
        let environ = build(&config);
        assert_eq!(environ.get("GREETING").map(String::as_str), Some("hello"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn env_overlay_wins_over_config_leaves() {
        let mut config = Config::default();
        config.options.clearenv = true;
        config.env.insert("FINITD_CHILD_COMMAND".to_string(), "overridden".to_string());
        config.child.command = "echo hi".to_string();
        let environ = build(&config);
        assert_eq!(
            environ.get("FINITD_CHILD_COMMAND").map(String::as_str),
            Some("overridden")
        );
    }
}
