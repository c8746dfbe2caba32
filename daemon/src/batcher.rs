//! Pending alert queues and the debounce flush rule

use crate::collector::ProcessInfo;
use crate::recipient::RecipientConfig;
use chrono::{DateTime, Local};
use std::collections::HashMap;

/// Grouped messages list at most this many processes.
pub const GROUP_LIST_LIMIT: usize = 10;

/// Shape of one flushed dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    Single(ProcessInfo),
    Grouped(Vec<ProcessInfo>),
}

impl Batch {
    fn from_drained(mut processes: Vec<ProcessInfo>) -> Option<Batch> {
        match processes.len() {
            0 => None,
            1 => processes.pop().map(Batch::Single),
            _ => Some(Batch::Grouped(processes)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Batch::Single(_) => 1,
            Batch::Grouped(processes) => processes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-recipient queues, each in detection order.
#[derive(Debug, Default)]
pub struct PendingQueues {
    queues: HashMap<String, Vec<ProcessInfo>>,
}

impl PendingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, recipient: &str, process: ProcessInfo) {
        self.queues
            .entry(recipient.to_string())
            .or_default()
            .push(process);
    }

    pub fn pending(&self, recipient: &str) -> &[ProcessInfo] {
        self.queues.get(recipient).map_or(&[], Vec::as_slice)
    }

    /// Recipients with at least one queued process, sorted.
    pub fn recipients(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drains the recipient's queue if it is due. With batching on, the queue
    /// is held until its oldest process is at least the window old.
    pub fn take_due(
        &mut self,
        recipient: &str,
        config: &RecipientConfig,
        now: DateTime<Local>,
    ) -> Option<Batch> {
        let queue = self.queues.get_mut(recipient)?;
        let first = queue.first()?;
        if config.batching && !window_elapsed(first.created_at, config.batch_window_secs, now) {
            return None;
        }
        Batch::from_drained(std::mem::take(queue))
    }

    pub fn remove(&mut self, recipient: &str) {
        self.queues.remove(recipient);
    }
}

/// Negative ages from clock skew count as not yet elapsed.
pub fn window_elapsed(first: DateTime<Local>, window_secs: u64, now: DateTime<Local>) -> bool {
    let age = now.signed_duration_since(first).num_seconds();
    age >= 0 && age as u64 >= window_secs
}
