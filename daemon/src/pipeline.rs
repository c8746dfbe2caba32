//! Per-cycle routing of new processes and the periodic flush pass

use crate::collector::ProcessInfo;
use crate::notifier::{Delivery, Notifier};
use crate::state::StateManager;
use chrono::{DateTime, Local};
use tracing::debug;

/// Counts from one pass, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub queued: usize,
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn count(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Sent(_) => self.sent += 1,
            Delivery::Suppressed => self.suppressed += 1,
            Delivery::Failed => self.failed += 1,
        }
    }
}

/// Runs every appeared process through each active recipient's filter.
/// Accepted processes are recorded in the stats ledger (if tracked), then
/// queued or, with batching off, sent right away.
pub async fn route_appeared(
    state: &StateManager,
    notifier: &Notifier,
    appeared: &[ProcessInfo],
    now: DateTime<Local>,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    let recipients = state.active_recipients();

    for info in appeared {
        for recipient in &recipients {
            let config = state.recipient_config(recipient).await;
            if !state.should_notify(info, &config) {
                debug!(pid = info.pid, name = %info.name, recipient = %recipient, "filtered out");
                continue;
            }
            if config.track_stats {
                state.record_stat(info, now);
            }
            if config.batching {
                state.enqueue(recipient, info.clone());
                report.queued += 1;
            } else {
                let delivery = notifier.send_single(recipient, &config, info, now).await;
                report.count(delivery);
            }
        }
    }
    report
}

/// Flushes every due queue. Holds the persistence lock for the whole pass;
/// a drained queue is not restored if its send fails.
pub async fn flush_pending(
    state: &StateManager,
    notifier: &Notifier,
    now: DateTime<Local>,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    let _persist = state.lock_persistence().await;

    for recipient in state.pending_recipients() {
        let config = state
            .peek_config(&recipient)
            .unwrap_or_else(|| state.defaults().clone());
        let Some(batch) = state.take_due(&recipient, &config, now) else {
            continue;
        };
        debug!(recipient = %recipient, count = batch.len(), "flushing");
        let delivery = notifier.send_batch(&recipient, &config, &batch, now).await;
        report.count(delivery);
    }
    report
}
