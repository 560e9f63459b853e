//! End-to-end scenarios driving the built `finitd` binary directly, the way
//! `original_source/finitd/test/test_finitd.py` drives the installed
//! command-line tool. Each test gets its own scratch directory so they can
//! run concurrently without clobbering each other's pidfiles.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn finitd_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_finitd"))
}

fn scratch_dir(tag: &str) -> PathBuf {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let dir = std::env::temp_dir().join(format!("finitd_e2e_{tag}_{now}"));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write a config file in `dir` naming `dir` itself as `child.chdir`, with
/// `child.command` set to `command` and a pidfile pair beside it.
fn write_config(dir: &Path, command: &str, extra: &str) -> PathBuf {
    let config_path = dir.join("finitd.conf");
    let contents = format!(
        "finitd.child.command: {command}\n\
         finitd.child.chdir: {}\n\
         finitd.child.stdout: stdout\n\
         finitd.child.stderr: stderr\n\
         finitd.options.pidfile: pid\n\
         finitd.watcher.pidfile: pid.watcher\n\
         {extra}",
        dir.display()
    );
    fs::write(&config_path, contents).unwrap();
    config_path
}

fn run_finitd(config_path: &Path, command: &str) -> std::process::ExitStatus {
    Command::new(finitd_binary())
        .arg(config_path)
        .arg(command)
        .status()
        .expect("spawn finitd")
}

fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap_or_default()
}

#[test]
fn start_redirects_stdout_to_configured_file() {
    let dir = scratch_dir("basic");
    let config = write_config(&dir, "echo foo", "");
    run_finitd(&config, "start");
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(read(&dir, "stdout"), "foo\n");
    assert_eq!(read(&dir, "stderr"), "");
}

#[test]
fn start_honors_shell_redirection_in_the_command_itself() {
    let dir = scratch_dir("redirection");
    let config = write_config(&dir, "echo foo > bar", "");
    run_finitd(&config, "start");
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(read(&dir, "bar"), "foo\n");
    assert_eq!(read(&dir, "stdout"), "");
}

#[test]
fn stdout_and_stderr_merge_when_configured_to_the_same_file() {
    let dir = scratch_dir("merged");
    fs::write(dir.join("x"), "").unwrap();
    let config_path = dir.join("finitd.conf");
    let contents = format!(
        "finitd.child.command: ls x y\n\
         finitd.child.chdir: {}\n\
         finitd.child.stdout: out\n\
         finitd.child.stderr: out\n\
         finitd.options.pidfile: pid\n\
         finitd.watcher.pidfile: pid.watcher\n",
        dir.display()
    );
    fs::write(&config_path, contents).unwrap();
    run_finitd(&config_path, "start");
    std::thread::sleep(Duration::from_millis(300));
    let out = read(&dir, "out");
    let mut lines: Vec<&str> = out.lines().collect();
    lines.sort();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].to_lowercase().contains("no such file"));
    assert_eq!(lines[1].trim(), "x");
}

#[test]
fn pidfiles_appear_while_running_and_vanish_after_exit() {
    let dir = scratch_dir("pidfile");
    let config = write_config(&dir, "sleep 2", "");
    run_finitd(&config, "start");
    std::thread::sleep(Duration::from_millis(500));

    let pidfile = dir.join("pid");
    let watcher_pidfile = dir.join("pid.watcher");
    assert!(pidfile.exists(), "pidfile should exist while the child runs");
    assert!(watcher_pidfile.exists(), "watcher pidfile should exist while supervising");
    let pid: u32 = fs::read_to_string(&pidfile).unwrap().trim().parse().unwrap();
    assert!(Path::new(&format!("/proc/{pid}")).exists());

    std::thread::sleep(Duration::from_millis(2200));
    assert!(!pidfile.exists(), "pidfile should be removed after the child exits");
    assert!(!watcher_pidfile.exists(), "watcher pidfile should be removed on exit");
}

#[test]
fn clearenv_limits_the_childs_environment_to_finitd_and_shell_basics() {
    let dir = scratch_dir("clearenv");
    let config = write_config(&dir, "env", "finitd.options.clearenv: true\n");
    run_finitd(&config, "start");
    std::thread::sleep(Duration::from_millis(300));
    let out = read(&dir, "stdout");
    for line in out.lines() {
        assert!(
            line.starts_with("FINITD_") || line.starts_with("PWD=") || line.starts_with("SHLVL="),
            "unexpected environment variable leaked through: {line:?}"
        );
    }
}

#[test]
fn stop_removes_the_pidfile_and_kills_the_child() {
    let dir = scratch_dir("stop");
    let config = write_config(&dir, "sleep 10", "");
    run_finitd(&config, "start");
    std::thread::sleep(Duration::from_millis(500));

    let pidfile = dir.join("pid");
    let pid: u32 = fs::read_to_string(&pidfile).unwrap().trim().parse().unwrap();

    run_finitd(&config, "stop");
    std::thread::sleep(Duration::from_millis(500));

    assert!(!pidfile.exists(), "pidfile should be gone after stop");
    assert!(!Path::new(&format!("/proc/{pid}")).exists(), "child should no longer exist");
}

#[test]
fn restart_yields_a_different_pid() {
    let dir = scratch_dir("restart");
    let config = write_config(&dir, "sleep 10", "finitd.options.restartWaitTime: 1\n");
    run_finitd(&config, "start");
    std::thread::sleep(Duration::from_millis(500));
    let pid1: u32 = fs::read_to_string(dir.join("pid")).unwrap().trim().parse().unwrap();

    run_finitd(&config, "restart");
    std::thread::sleep(Duration::from_millis(2500));
    let pid2: u32 = fs::read_to_string(dir.join("pid")).unwrap().trim().parse().unwrap();

    assert_ne!(pid1, pid2, "restart should spawn a new child process");
}
