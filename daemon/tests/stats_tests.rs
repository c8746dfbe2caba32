mod common;

use common::{at, process};
use procwatch_daemon::stats::{StatRecord, StatsLedger, HISTORY_LIMIT};

fn record(pid: u32, cpu: f64, memory: f64) -> StatRecord {
    StatRecord::from_process(&process(pid, "worker", cpu, memory), at(12, 0, 0))
}

#[test]
fn test_history_is_capped_with_fifo_eviction() {
    let mut ledger = StatsLedger::new();
    for pid in 0..HISTORY_LIMIT as u32 {
        ledger.record("worker", record(pid, 0.0, 0.0));
    }
    assert_eq!(ledger.len("worker"), HISTORY_LIMIT);
    assert_eq!(ledger.history("worker").unwrap()[0].pid, 0);

    ledger.record("worker", record(5000, 0.0, 0.0));
    let history = ledger.history("worker").unwrap();
    assert_eq!(history.len(), HISTORY_LIMIT);
    assert_eq!(history[0].pid, 1);
    assert_eq!(history.back().unwrap().pid, 5000);
}

#[test]
fn test_histories_are_per_name() {
    let mut ledger = StatsLedger::new();
    ledger.record("a", record(1, 0.0, 0.0));
    ledger.record("b", record(2, 0.0, 0.0));
    ledger.record("b", record(3, 0.0, 0.0));
    assert_eq!(ledger.len("a"), 1);
    assert_eq!(ledger.len("b"), 2);
    assert_eq!(ledger.len("c"), 0);
    assert_eq!(ledger.top(1), vec![("b", 2)]);
}

#[test]
fn test_enforce_limit_trims_oldest() {
    let mut records = Vec::new();
    for pid in 0..(HISTORY_LIMIT as u32 + 5) {
        records.push(record(pid, 0.0, 0.0));
    }
    let json = serde_json::json!({ "worker": records });
    let mut ledger: StatsLedger = serde_json::from_value(json).unwrap();
    ledger.enforce_limit();
    let history = ledger.history("worker").unwrap();
    assert_eq!(history.len(), HISTORY_LIMIT);
    assert_eq!(history[0].pid, 5);
}

#[test]
fn test_summary() {
    let mut ledger = StatsLedger::new();
    for (i, cpu) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
        ledger.record("worker", record(i as u32, cpu, cpu * 10.0));
    }
    let summary = ledger.summary("worker").unwrap();
    assert_eq!(summary.sample_count, 4);
    assert_eq!(summary.cpu_avg, 2.5);
    assert_eq!(summary.cpu_p95, 4.0);
    assert_eq!(summary.memory_avg, 25.0);
    assert!(ledger.summary("missing").is_none());
}

#[test]
fn test_stored_shape() {
    let mut ledger = StatsLedger::new();
    ledger.record("worker", record(9, 1.5, 20.0));
    let value = serde_json::to_value(&ledger).unwrap();
    let entry = &value["worker"][0];
    assert_eq!(entry["pid"], 9);
    assert_eq!(entry["user"], "alice");
    assert_eq!(entry["cpu"], 1.5);
    assert_eq!(entry["memory"], 20.0);
    assert!(entry["timestamp"].is_string());
}
