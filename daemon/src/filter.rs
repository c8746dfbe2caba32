//! Per-recipient notify decision

use crate::collector::ProcessInfo;
use crate::recipient::{FilterMode, RecipientConfig};
use std::collections::HashSet;

/// Well-known background and kernel task names. Also the initial ignore list.
pub const DEFAULT_SYSTEM_PROCESSES: &[&str] = &[
    "systemd",
    "kthreadd",
    "rcu_gp",
    "rcu_par_gp",
    "kworker",
    "kcompactd",
    "ksoftirqd",
    "migration",
    "watchdog",
    "cpuhp",
    "kdevtmpfs",
    "netns",
    "khungtaskd",
    "oom_reaper",
    "writeback",
    "kblockd",
    "kintegrityd",
    "md",
    "devfreq_wq",
    "watchdogd",
    "kswapd",
    "sshd",
];

pub fn default_system_processes() -> Vec<String> {
    DEFAULT_SYSTEM_PROCESSES.iter().map(|s| s.to_string()).collect()
}

/// The process-wide name sets a decision reads.
#[derive(Debug, Clone, Copy)]
pub struct NameSets<'a> {
    pub ignored: &'a HashSet<String>,
    pub whitelist: &'a HashSet<String>,
    pub system: &'a HashSet<String>,
}

impl NameSets<'_> {
    fn is_system_noise(&self, name: &str, config: &RecipientConfig) -> bool {
        config.ignore_system && self.system.contains(name)
    }
}

/// Thresholds first, then the mode's name rules. Unknown modes accept.
pub fn should_notify(process: &ProcessInfo, config: &RecipientConfig, sets: NameSets<'_>) -> bool {
    if process.cpu_percent < config.min_cpu_percent {
        return false;
    }
    if process.memory_mb < config.min_memory_mb {
        return false;
    }

    let name = process.name.as_str();
    match &config.mode {
        FilterMode::Whitelist => sets.whitelist.contains(name),
        FilterMode::Blacklist => {
            !sets.ignored.contains(name) && !sets.is_system_noise(name, config)
        }
        FilterMode::Smart => {
            if sets.whitelist.contains(name) {
                return true;
            }
            !sets.ignored.contains(name) && !sets.is_system_noise(name, config)
        }
        FilterMode::Unknown(_) => true,
    }
}
