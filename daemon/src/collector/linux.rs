use super::{status_label, ProcessCollector, ProcessInfo};
use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PASSWD_PATH: &str = "/etc/passwd";
/// Kernel truncates `comm` to this many bytes.
const COMM_LEN: usize = 15;

struct StatFields {
    name: String,
    state: char,
    total_ticks: u64,
    start_time_ticks: u64,
    rss_pages: u64,
}

pub struct LinuxProcessCollector {
    proc_root: PathBuf,
    page_size: u64,
    clock_ticks: u64,
    boot_time: u64,
    cpu_window: Duration,
    users: Mutex<HashMap<u32, String>>,
}

impl LinuxProcessCollector {
    pub fn new(cpu_window: Duration) -> Self {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) }.max(1) as u64;
        let clock_ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) }.max(1) as u64;
        Self {
            proc_root: PathBuf::from("/proc"),
            page_size,
            clock_ticks,
            boot_time: Self::get_boot_time(),
            cpu_window,
            users: Mutex::new(load_passwd(Path::new(PASSWD_PATH))),
        }
    }

    fn get_boot_time() -> u64 {
        let stat = fs::read_to_string("/proc/stat").unwrap_or_default();
        stat.lines()
            .find_map(|line| line.strip_prefix("btime "))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    fn read_stat(&self, proc_dir: &Path) -> Option<StatFields> {
        let content = fs::read_to_string(proc_dir.join("stat")).ok()?;
        parse_stat(&content)
    }

    fn read_ticks(&self, proc_dir: &Path) -> Option<u64> {
        self.read_stat(proc_dir).map(|s| s.total_ticks)
    }

    fn read_uid(&self, proc_dir: &Path) -> Option<u32> {
        let status = fs::read_to_string(proc_dir.join("status")).ok()?;
        status
            .lines()
            .find_map(|line| line.strip_prefix("Uid:"))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|uid| uid.parse().ok())
    }

    fn username(&self, uid: u32) -> String {
        let mut users = self.users.lock();
        if !users.contains_key(&uid) {
            // Accounts created after startup
            *users = load_passwd(Path::new(PASSWD_PATH));
        }
        users.get(&uid).cloned().unwrap_or_else(|| uid.to_string())
    }

    fn created_at(&self, start_time_ticks: u64) -> DateTime<Local> {
        let since_boot = start_time_ticks as f64 / self.clock_ticks as f64;
        let secs = self.boot_time as i64 + since_boot.trunc() as i64;
        let nanos = (since_boot.fract() * 1e9) as u32;
        Local
            .timestamp_opt(secs, nanos)
            .single()
            .unwrap_or_else(Local::now)
    }

    fn parse_process(&self, pid: u32) -> Option<ProcessInfo> {
        let proc_dir = self.proc_root.join(pid.to_string());

        let first = self.read_stat(&proc_dir)?;
        std::thread::sleep(self.cpu_window);
        // Gone during the window
        let second_ticks = self.read_ticks(&proc_dir)?;

        let window = self.cpu_window.as_secs_f64();
        let cpu_percent = if window > 0.0 {
            let cpu_seconds =
                second_ticks.saturating_sub(first.total_ticks) as f64 / self.clock_ticks as f64;
            (cpu_seconds / window) * 100.0
        } else {
            0.0
        };

        let memory_mb = round2((first.rss_pages * self.page_size) as f64 / (1024.0 * 1024.0));

        let cmdline = fs::read(proc_dir.join("cmdline"))
            .ok()
            .map(|raw| {
                String::from_utf8_lossy(&raw)
                    .replace('\0', " ")
                    .trim()
                    .to_string()
            })
            .filter(|c| !c.is_empty());

        let exe = fs::read_link(proc_dir.join("exe")).ok();
        let uid = self.read_uid(&proc_dir)?;

        Some(ProcessInfo {
            pid,
            name: full_name(&first.name, cmdline.as_deref()),
            exe,
            cmdline,
            username: self.username(uid),
            created_at: self.created_at(first.start_time_ticks),
            status: status_label(first.state).to_string(),
            cpu_percent,
            memory_mb,
        })
    }
}

impl Default for LinuxProcessCollector {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl ProcessCollector for LinuxProcessCollector {
    fn list_pids(&self) -> Vec<u32> {
        let mut pids = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.proc_root) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(pid) = name.parse::<u32>() {
                        pids.push(pid);
                    }
                }
            }
        }
        pids
    }

    fn get_process(&self, pid: u32) -> Option<ProcessInfo> {
        self.parse_process(pid)
    }
}

/// Parses `/proc/<pid>/stat`. The name field may itself contain spaces and
/// parentheses, so fields are split after the last `)`.
fn parse_stat(content: &str) -> Option<StatFields> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    let name = content.get(open + 1..close)?.to_string();
    // Fields after the name start at field 3 (state)
    let rest: Vec<&str> = content.get(close + 1..)?.split_whitespace().collect();
    if rest.len() < 22 {
        return None;
    }
    let state = rest[0].chars().next().unwrap_or('?');
    let utime: u64 = rest[11].parse().unwrap_or(0);
    let stime: u64 = rest[12].parse().unwrap_or(0);
    let start_time_ticks: u64 = rest[19].parse().unwrap_or(0);
    let rss_pages: u64 = rest[21].parse().unwrap_or(0);
    Some(StatFields {
        name,
        state,
        total_ticks: utime + stime,
        start_time_ticks,
        rss_pages,
    })
}

/// `comm` is truncated; recover the full executable name from argv[0] when it
/// extends the truncated one.
fn full_name(comm: &str, cmdline: Option<&str>) -> String {
    if comm.len() >= COMM_LEN {
        if let Some(argv0) = cmdline.and_then(|c| c.split_whitespace().next()) {
            let base = argv0.rsplit('/').next().unwrap_or(argv0);
            if base.starts_with(comm) {
                return base.to_string();
            }
        }
    }
    comm.to_string()
}

fn load_passwd(path: &Path) -> HashMap<u32, String> {
    let content = fs::read_to_string(path).unwrap_or_default();
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            let uid = fields.nth(1)?.parse().ok()?;
            Some((uid, name.to_string()))
        })
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
