//! Bounded per-name history of alerted processes

use crate::collector::ProcessInfo;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Records kept per process name. The oldest is evicted first.
pub const HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub timestamp: DateTime<Local>,
    pub pid: u32,
    pub user: String,
    pub cpu: f64,
    pub memory: f64,
}

impl StatRecord {
    pub fn from_process(info: &ProcessInfo, timestamp: DateTime<Local>) -> Self {
        Self {
            timestamp,
            pid: info.pid,
            user: info.username.clone(),
            cpu: info.cpu_percent,
            memory: info.memory_mb,
        }
    }
}

/// Aggregates over one name's history.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessStats {
    pub name: String,
    pub sample_count: usize,
    pub first_seen: DateTime<Local>,
    pub last_seen: DateTime<Local>,
    pub cpu_avg: f64,
    pub cpu_p95: f64,
    pub memory_avg: f64,
    pub memory_p95: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsLedger {
    entries: HashMap<String, VecDeque<StatRecord>>,
}

impl StatsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, record: StatRecord) {
        let history = self.entries.entry(name.to_string()).or_default();
        history.push_back(record);
        while history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
    }

    /// Trims histories loaded from storage that exceed the limit.
    pub fn enforce_limit(&mut self) {
        for history in self.entries.values_mut() {
            let excess = history.len().saturating_sub(HISTORY_LIMIT);
            history.drain(..excess);
        }
    }

    pub fn history(&self, name: &str) -> Option<&VecDeque<StatRecord>> {
        self.entries.get(name)
    }

    pub fn len(&self, name: &str) -> usize {
        self.entries.get(name).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn summary(&self, name: &str) -> Option<ProcessStats> {
        let history = self.entries.get(name).filter(|h| !h.is_empty())?;
        let mut cpu: Vec<f64> = history.iter().map(|r| r.cpu).collect();
        let mut memory: Vec<f64> = history.iter().map(|r| r.memory).collect();
        Some(ProcessStats {
            name: name.to_string(),
            sample_count: history.len(),
            first_seen: history.front()?.timestamp,
            last_seen: history.back()?.timestamp,
            cpu_avg: mean(&cpu),
            cpu_p95: p95(&mut cpu),
            memory_avg: mean(&memory),
            memory_p95: p95(&mut memory),
        })
    }

    /// Names with the most recorded alerts, descending; ties by name.
    pub fn top(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = self
            .entries
            .iter()
            .map(|(name, h)| (name.as_str(), h.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        counts.truncate(limit);
        counts
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Nearest-rank 95th percentile.
fn p95(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = ((values.len() as f64) * 0.95).ceil() as usize;
    values[rank.clamp(1, values.len()) - 1]
}
