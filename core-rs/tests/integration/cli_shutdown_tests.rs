//! CLI Shutdown Integration Tests
//!
//! `cdbg run` must take its workers down with it when it is asked to stop,
//! whether by Ctrl+C or by a service manager's SIGTERM.

#![cfg(unix)]

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Worker script that records its pid, then becomes a long sleep
fn write_worker_script(dir: &Path) -> (String, String) {
    let pid_file = dir.join("pids");
    let script = dir.join("worker.sh");
    fs::write(
        &script,
        format!("#!/bin/sh\necho $$ >> {}\nexec sleep 1001\n", pid_file.display()),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    (script.display().to_string(), pid_file.display().to_string())
}

fn wait_for_pids(pid_file: &str, count: usize) -> Vec<i32> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let pids: Vec<i32> = fs::read_to_string(pid_file)
            .unwrap_or_default()
            .lines()
            .filter_map(|l| l.trim().parse().ok())
            .collect();
        if pids.len() >= count || Instant::now() > deadline {
            return pids;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> Option<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        thread::sleep(Duration::from_millis(50));
    }
    None
}

fn is_running(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

fn stop_supervisor_with(signal: Signal, base_port: &str) {
    let temp_dir = TempDir::new().unwrap();
    let (script, pid_file) = write_worker_script(temp_dir.path());

    let mut cdbg = Command::new(env!("CARGO_BIN_EXE_cdbg"))
        .args(["run", "--workers", "2", "--", &script])
        .env("CLUSTER_WORKER_DEBUG_PORT", base_port)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let pids = wait_for_pids(&pid_file, 2);
    assert_eq!(pids.len(), 2, "workers did not start");

    kill(Pid::from_raw(cdbg.id() as i32), signal).unwrap();

    let status = wait_for_exit(&mut cdbg, Duration::from_secs(15));
    if status.is_none() {
        let _ = cdbg.kill();
    }
    let leftover: Vec<i32> = pids.iter().copied().filter(|p| is_running(*p)).collect();
    for pid in &leftover {
        let _ = kill(Pid::from_raw(*pid), Signal::SIGKILL);
    }

    assert!(status.is_some_and(|s| s.success()), "cdbg did not shut down cleanly");
    assert!(leftover.is_empty(), "workers outlived cdbg: {:?}", leftover);
}

#[test]
fn test_sigterm_terminates_workers() {
    stop_supervisor_with(Signal::SIGTERM, "9800");
}

#[test]
fn test_sigint_terminates_workers() {
    stop_supervisor_with(Signal::SIGINT, "9810");
}
