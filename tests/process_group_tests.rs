//! Process supervision tests
//!
//! Build commands (`bin/magento`, `composer`, the xargs fan-out) spawn their
//! own children. If the hook is stopped, the whole tree has to go with it.
//!
//! These tests verify that:
//! 1. Commands run through the shell runner lead their own process group
//! 2. Signalling that group takes down grandchildren too
//! 3. Background commands return immediately and run in a group of their own

use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use magecloud_build::build_log::BuildLog;
use magecloud_build::process_guard::CommandProcessGroup;
use magecloud_build::shell::{CommandRunner, ShellRunner};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Helper: Check if a process is alive (not dead or zombie)
fn is_process_alive(pid: u32) -> bool {
    if kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            // 'Z' = zombie, 'X' = dead
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

fn wait_for_process_death(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !is_process_alive(pid) {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

// =============================================================================
// Shell Runner Tests
// =============================================================================

#[test]
fn test_executed_command_leads_its_own_group() {
    let dir = tempfile::TempDir::new().unwrap();
    let (log, _capture) = BuildLog::capture();
    let mut runner = ShellRunner::new(dir.path(), log);

    let output = runner
        .execute("echo $$; cut -d' ' -f5 /proc/$$/stat")
        .unwrap();

    assert_eq!(output.len(), 2, "{output:?}");
    assert_eq!(output[0], output[1], "shell pid should equal its group id");
    assert_ne!(output[1], nix::unistd::getpgrp().to_string());
}

#[test]
fn test_background_command_is_not_waited_for() {
    let dir = tempfile::TempDir::new().unwrap();
    let marker = dir.path().join("done");
    let (log, capture) = BuildLog::capture();
    let mut runner = ShellRunner::new(dir.path(), log);

    let start = Instant::now();
    runner.background_execute(&format!("sleep 1; touch {}", marker.display()));
    assert!(start.elapsed() < Duration::from_millis(900));
    assert!(!marker.exists());
    assert!(capture.contains("Execute command in background: nohup sleep 1;"));

    let deadline = Instant::now() + Duration::from_secs(5);
    while !marker.exists() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    assert!(marker.exists(), "background command should eventually run");
}

// =============================================================================
// Group Signal Tests
// =============================================================================

/// The fan-out is `bash` running `xargs` running more `bash`; a group
/// signal must reach the leaves.
#[test]
fn test_group_signal_kills_grandchildren() {
    let mut parent = Command::new("bash")
        .args(["-c", "sleep 1000 & echo $!; wait"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .in_new_process_group()
        .spawn()
        .expect("Failed to spawn parent bash");
    let parent_pid = parent.id();

    let mut line = String::new();
    if let Some(stdout) = parent.stdout.take() {
        use std::io::BufRead;
        std::io::BufReader::new(stdout).read_line(&mut line).unwrap();
    }
    let child_pid: u32 = line.trim().parse().expect("child pid");

    assert!(is_process_alive(parent_pid));
    assert!(is_process_alive(child_pid));

    let _ = kill(Pid::from_raw(-(parent_pid as i32)), Signal::SIGTERM);

    let child_died = wait_for_process_death(child_pid, Duration::from_secs(3));
    let _ = parent.wait();
    if !child_died {
        let _ = kill(Pid::from_raw(child_pid as i32), Signal::SIGKILL);
    }
    assert!(child_died, "grandchild {} survived the group signal", child_pid);
}

#[test]
fn test_detached_command_has_separate_group() {
    let mut child = Command::new("sleep")
        .arg("5")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .detached()
        .spawn()
        .expect("Failed to spawn sleep");
    let pid = child.id();

    let pgid = nix::unistd::getpgid(Some(Pid::from_raw(pid as i32))).unwrap();
    assert_eq!(pgid.as_raw(), pid as i32);

    let _ = kill(Pid::from_raw(-(pid as i32)), Signal::SIGKILL);
    let _ = child.wait();
}
