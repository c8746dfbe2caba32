use procwatch_daemon::collector::{status_label, LinuxProcessCollector, ProcessCollector};
use std::time::Duration;

fn collector() -> LinuxProcessCollector {
    LinuxProcessCollector::new(Duration::from_millis(10))
}

#[test]
fn test_list_pids_contains_current_process() {
    let pids = collector().list_pids();
    assert!(pids.contains(&std::process::id()), "Current process should be listed");
}

#[test]
fn test_get_process_returns_current_process() {
    let current_pid = std::process::id();
    let process = collector().get_process(current_pid);
    assert!(process.is_some(), "Should find current process");
    let p = process.unwrap();
    assert_eq!(p.pid, current_pid);
    assert!(!p.name.is_empty());
    assert!(!p.username.is_empty());
    assert!(p.memory_mb > 0.0);
    assert!(p.cpu_percent >= 0.0);
    assert!(p.exe.is_some());
}

#[test]
fn test_get_process_returns_none_for_invalid_pid() {
    let process = collector().get_process(999999999);
    assert!(process.is_none());
}

#[test]
fn test_status_labels() {
    assert_eq!(status_label('R'), "running");
    assert_eq!(status_label('Z'), "zombie");
    assert_eq!(status_label('?'), "unknown");
}
