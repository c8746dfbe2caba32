mod common;

use common::{process, ScriptedCollector};
use procwatch_daemon::detector::ChangeDetector;
use std::collections::HashSet;

fn ids(pids: &[u32]) -> HashSet<u32> {
    pids.iter().copied().collect()
}

#[test]
fn test_appeared_is_set_difference() {
    let detector = ChangeDetector::primed([1, 2, 3]);
    assert_eq!(detector.appeared(&ids(&[2, 3, 4, 9])), vec![4, 9]);
}

#[test]
fn test_gone_processes_are_not_reported() {
    let detector = ChangeDetector::primed([1, 2, 3]);
    assert!(detector.appeared(&ids(&[1])).is_empty());
}

#[test]
fn test_second_pass_with_same_snapshot_is_empty() {
    let mut detector = ChangeDetector::primed([1]);
    let current = ids(&[1, 2, 3]);
    assert_eq!(detector.appeared(&current), vec![2, 3]);
    detector.advance(current.clone());
    assert!(detector.appeared(&current).is_empty());
}

#[test]
fn test_advance_replaces_instead_of_merging() {
    let mut detector = ChangeDetector::primed([1, 2]);
    detector.advance(ids(&[3]));
    assert_eq!(detector.known(), &ids(&[3]));
    // pid 1 came back: reported again
    assert_eq!(detector.appeared(&ids(&[1, 3])), vec![1]);
}

#[test]
fn test_detect_describes_new_processes() {
    let collector = ScriptedCollector::default();
    collector.set(vec![(1, Some(process(1, "init", 0.0, 1.0)))]);
    let mut detector = ChangeDetector::new();
    let first = detector.detect(&collector);
    assert_eq!(first.len(), 1);

    collector.set(vec![
        (1, Some(process(1, "init", 0.0, 1.0))),
        (42, Some(process(42, "malware.bin", 5.0, 50.0))),
    ]);
    let appeared = detector.detect(&collector);
    assert_eq!(appeared.len(), 1);
    assert_eq!(appeared[0].name, "malware.bin");

    assert!(detector.detect(&collector).is_empty());
}

#[test]
fn test_unreadable_process_is_skipped_but_still_known() {
    let collector = ScriptedCollector::default();
    collector.set(vec![
        (10, Some(process(10, "bash", 0.0, 2.0))),
        (11, None),
    ]);
    let mut detector = ChangeDetector::new();
    let appeared = detector.detect(&collector);
    assert_eq!(appeared.iter().map(|p| p.pid).collect::<Vec<_>>(), vec![10]);
    assert!(detector.known().contains(&11));
    assert!(detector.detect(&collector).is_empty());
}
