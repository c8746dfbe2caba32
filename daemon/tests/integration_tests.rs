//! End-to-end tests: detection through filtering, batching and dispatch

mod common;

use chrono::Duration;
use common::{at, process, state_with, RecordingTransport, ScriptedCollector};
use procwatch_daemon::{
    db::Store,
    detector::ChangeDetector,
    filter::default_system_processes,
    notifier::Notifier,
    pipeline::{flush_pending, route_appeared},
    recipient::{FilterMode, RecipientConfig},
    state::StateManager,
};
use std::sync::Arc;
use tempfile::TempDir;

fn notifier() -> (Arc<RecordingTransport>, Notifier) {
    let transport = Arc::new(RecordingTransport::default());
    (transport.clone(), Notifier::new(transport))
}

/// Blacklist, system noise ignored, no thresholds, batching off
#[tokio::test]
async fn test_system_noise_suppressed_and_new_binary_alerted() {
    let defaults = RecipientConfig {
        mode: FilterMode::Blacklist,
        ignore_system: true,
        batching: false,
        ..RecipientConfig::default()
    };
    let state = state_with(defaults, &["kworker", "systemd"]);
    state.activate("42").await;
    let (transport, notifier) = notifier();

    let collector = ScriptedCollector::default();
    collector.set(vec![(1, Some(process(1, "init", 0.0, 1.0)))]);
    let mut detector = ChangeDetector::primed([1]);
    collector.set(vec![
        (1, Some(process(1, "init", 0.0, 1.0))),
        (200, Some(process(200, "kworker", 0.0, 0.0))),
        (201, Some(process(201, "malware.bin", 5.0, 50.0))),
    ]);
    let appeared = detector.detect(&collector);
    assert_eq!(appeared.len(), 2);

    let report = route_appeared(&state, &notifier, &appeared, at(12, 0, 5)).await;
    assert_eq!(report.sent, 1);
    assert_eq!(report.queued, 0);
    assert_eq!(state.pending_len("42"), 0);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat_id, "42");
    assert!(sent[0].text.contains("malware.bin"));
    assert!(!sent[0].text.contains("kworker"));
    let actions: Vec<&str> = sent[0].markup.as_ref().unwrap().callback_data().collect();
    assert_eq!(actions, vec!["ignore_malware.bin", "whitelist_malware.bin"]);

    // Stats tracked only for the accepted process
    assert_eq!(state.with_stats(|s| s.len("malware.bin")), 1);
    assert_eq!(state.with_stats(|s| s.len("kworker")), 0);
}

/// Two processes in one cycle, batching on with a 30s window
#[tokio::test]
async fn test_grouped_flush_after_window() {
    let state = state_with(RecipientConfig::default(), &[]);
    state.activate("42").await;
    let (transport, notifier) = notifier();

    let a = process(300, "alpha", 1.0, 10.0);
    let b = process(301, "beta", 2.0, 20.0);
    let created = a.created_at;
    let report = route_appeared(&state, &notifier, &[a, b], created).await;
    assert_eq!(report.queued, 2);
    assert!(transport.sent().is_empty());

    let early = flush_pending(&state, &notifier, created + Duration::seconds(10)).await;
    assert_eq!(early.sent, 0);
    assert_eq!(state.pending_len("42"), 2);

    let due = flush_pending(&state, &notifier, created + Duration::seconds(31)).await;
    assert_eq!(due.sent, 1);
    assert_eq!(state.pending_len("42"), 0);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("New processes detected: 2"));
    assert!(sent[0].text.contains("alpha"));
    assert!(sent[0].text.contains("beta"));
    assert!(sent[0].markup.is_none());
}

#[tokio::test]
async fn test_grouped_message_lists_first_ten() {
    let state = state_with(RecipientConfig::default(), &[]);
    state.activate("42").await;
    let (transport, notifier) = notifier();

    let processes: Vec<_> = (0..13)
        .map(|i| process(1000 + i, &format!("proc{i:02}"), 0.0, 0.0))
        .collect();
    route_appeared(&state, &notifier, &processes, at(12, 0, 0)).await;
    flush_pending(&state, &notifier, at(13, 0, 0)).await;

    let text = transport.sent()[0].text.clone();
    assert!(text.contains("proc09"));
    assert!(!text.contains("proc10"));
    assert!(text.contains("... and 3 more"));
}

#[tokio::test]
async fn test_single_queued_record_gets_actions() {
    let state = state_with(RecipientConfig::default(), &[]);
    state.activate("42").await;
    let (transport, notifier) = notifier();

    route_appeared(&state, &notifier, &[process(5, "lonely", 0.0, 0.0)], at(12, 0, 0)).await;
    flush_pending(&state, &notifier, at(12, 1, 0)).await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("New process"));
    assert!(sent[0].markup.is_some());
}

#[tokio::test]
async fn test_quiet_hours_drop_at_dispatch_time() {
    let defaults = RecipientConfig {
        quiet_hours_enabled: true,
        ..RecipientConfig::default()
    };
    let state = state_with(defaults, &[]);
    state.activate("42").await;
    let (transport, notifier) = notifier();

    // Queued in daytime, flushed inside 22:00-08:00
    let mut p = process(9, "nightly", 0.0, 0.0);
    p.created_at = at(21, 59, 0);
    route_appeared(&state, &notifier, &[p], at(21, 59, 0)).await;
    let report = flush_pending(&state, &notifier, at(23, 0, 0)).await;

    assert_eq!(report.suppressed, 1);
    assert!(transport.sent().is_empty());
    // Dropped, not kept for later
    assert_eq!(state.pending_len("42"), 0);
}

#[tokio::test]
async fn test_failed_send_still_clears_queue() {
    let state = state_with(RecipientConfig::default(), &[]);
    state.activate("42").await;
    let (transport, notifier) = notifier();
    *transport.fail_sends.lock() = true;

    route_appeared(&state, &notifier, &[process(1, "x", 0.0, 0.0)], at(12, 0, 0)).await;
    let report = flush_pending(&state, &notifier, at(12, 5, 0)).await;
    assert_eq!(report.failed, 1);
    assert_eq!(state.pending_len("42"), 0);
}

#[tokio::test]
async fn test_each_recipient_filters_independently() {
    let state = state_with(RecipientConfig::default(), &[]);
    state.activate("a").await;
    state.activate("b").await;
    state
        .update_config("b", |c| c.mode = FilterMode::Whitelist)
        .await;
    state.allow("nginx").await;
    let (_transport, notifier) = notifier();

    let appeared = [process(1, "nginx", 0.0, 0.0), process(2, "curl", 0.0, 0.0)];
    route_appeared(&state, &notifier, &appeared, at(12, 0, 0)).await;

    assert_eq!(state.pending_len("a"), 2);
    assert_eq!(state.pending_len("b"), 1);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("state.db");
    let system = default_system_processes();

    {
        let state = StateManager::load(Store::open(&db_path).unwrap(), RecipientConfig::default(), &system);
        // First run: ignore list seeded from the system list
        assert!(state.ignored_names().contains(&"kworker".to_string()));
        state.activate("42").await;
        state.update_config("42", |c| c.min_cpu_percent = 7.0).await;
        state.allow("nginx").await;
        state.unignore("sshd").await;
        state.record_stat(&process(1, "nginx", 1.0, 2.0), at(12, 0, 0));
        state.save_all().await;
    }

    let state = StateManager::load(Store::open(&db_path).unwrap(), RecipientConfig::default(), &system);
    assert_eq!(state.active_recipients(), vec!["42".to_string()]);
    assert_eq!(state.peek_config("42").unwrap().min_cpu_percent, 7.0);
    assert_eq!(state.whitelisted_names(), vec!["nginx".to_string()]);
    assert!(!state.ignored_names().contains(&"sshd".to_string()));
    assert_eq!(state.with_stats(|s| s.len("nginx")), 1);
}

#[tokio::test]
async fn test_lazy_config_creation_is_persisted() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("state.db");
    {
        let state = StateManager::load(Store::open(&db_path).unwrap(), RecipientConfig::default(), &[]);
        assert!(state.peek_config("99").is_none());
        let config = state.recipient_config("99").await;
        assert_eq!(config, RecipientConfig::default());
    }
    let state = StateManager::load(Store::open(&db_path).unwrap(), RecipientConfig::default(), &[]);
    assert!(state.peek_config("99").is_some());
}
