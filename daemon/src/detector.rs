//! New-process detection by diffing pid sets between cycles

use crate::collector::{ProcessCollector, ProcessInfo};
use std::collections::HashSet;
use tracing::debug;

/// Owns the pid set observed in the previous cycle.
///
/// A pid that is reused between two cycles is indistinguishable from the
/// earlier process and is not reported again.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    known: HashSet<u32>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing pid set so already-running processes are not reported.
    pub fn primed(pids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            known: pids.into_iter().collect(),
        }
    }

    pub fn known(&self) -> &HashSet<u32> {
        &self.known
    }

    /// Pids in `current` that were not known last cycle, ascending.
    pub fn appeared(&self, current: &HashSet<u32>) -> Vec<u32> {
        let mut new: Vec<u32> = current
            .iter()
            .filter(|pid| !self.known.contains(pid))
            .copied()
            .collect();
        new.sort_unstable();
        new
    }

    /// Replaces the known set. Never merges.
    pub fn advance(&mut self, current: HashSet<u32>) {
        self.known = current;
    }

    /// One full cycle: list, diff, describe the new pids, advance.
    ///
    /// A pid whose attributes cannot be read is dropped from the result; the
    /// known set is still replaced with every listed pid.
    pub fn detect(&mut self, collector: &dyn ProcessCollector) -> Vec<ProcessInfo> {
        let current: HashSet<u32> = collector.list_pids().into_iter().collect();
        let new_pids = self.appeared(&current);

        let mut appeared = Vec::with_capacity(new_pids.len());
        for pid in new_pids {
            match collector.get_process(pid) {
                Some(info) => appeared.push(info),
                None => debug!(pid, "new process vanished or unreadable, skipping"),
            }
        }

        self.advance(current);
        appeared
    }
}
