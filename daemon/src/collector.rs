//! Process table sampler (reads /proc on Linux)

mod linux;

pub use linux::LinuxProcessCollector;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One live process as seen during a single sampling cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub exe: Option<PathBuf>,
    pub cmdline: Option<String>,
    pub username: String,
    pub created_at: DateTime<Local>,
    pub status: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

pub trait ProcessCollector: Send + Sync {
    /// Identities of every live process. Cheap: no per-process attribute reads.
    fn list_pids(&self) -> Vec<u32>;

    /// Full description of one process, or `None` if it vanished or could not be read.
    /// Blocks for the CPU sampling window.
    fn get_process(&self, pid: u32) -> Option<ProcessInfo>;

    fn list_processes(&self) -> Vec<ProcessInfo> {
        self.list_pids()
            .into_iter()
            .filter_map(|pid| self.get_process(pid))
            .collect()
    }
}

/// Human label for a `/proc/<pid>/stat` state character.
pub fn status_label(state: char) -> &'static str {
    match state {
        'R' => "running",
        'S' => "sleeping",
        'D' => "disk-sleep",
        'T' => "stopped",
        't' => "tracing-stop",
        'Z' => "zombie",
        'X' | 'x' => "dead",
        'I' => "idle",
        'K' => "wake-kill",
        'W' => "waking",
        'P' => "parked",
        _ => "unknown",
    }
}
