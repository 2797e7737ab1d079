#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use kmon_core::{ChangeRecord, EventType};
use kmon_store::{ChangeLog, KnownIndex, KnownVersion};

fn rec(writer: usize, n: usize) -> ChangeRecord {
    ChangeRecord {
        id: format!("w{}-{}", writer, n),
        timestamp: Utc::now(),
        event_type: EventType::Modified,
        resource_type: format!("type-{}", writer),
        namespace: "ns".to_string(),
        name: format!("obj-{}", n),
        details: String::new(),
        is_read: false,
    }
}

#[test]
fn concurrent_appends_lose_nothing() {
    let log = Arc::new(ChangeLog::new(Utc::now()));
    let writers = 8;
    let per_writer = 100;
    let mut handles = Vec::new();
    for w in 0..writers {
        let log = Arc::clone(&log);
        handles.push(std::thread::spawn(move || {
            for n in 0..per_writer {
                log.append(rec(w, n));
            }
        }));
    }
    // readers hammer list/stats meanwhile
    for _ in 0..4 {
        let log = Arc::clone(&log);
        handles.push(std::thread::spawn(move || {
            for _ in 0..50 {
                let snapshot = log.list();
                let stats = log.stats();
                assert!(snapshot.len() <= 1000);
                assert!(stats.total <= 1000);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let all = log.list();
    assert_eq!(all.len(), writers * per_writer);
    let ids: HashSet<&str> = all.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids.len(), writers * per_writer);

    // per-writer order survives interleaving
    for w in 0..writers {
        let seq: Vec<&str> = all.iter().filter(|r| r.resource_type == format!("type-{}", w)).map(|r| r.id.as_str()).collect();
        let expected: Vec<String> = (0..per_writer).map(|n| format!("w{}-{}", w, n)).collect();
        assert_eq!(seq, expected.iter().map(|s| s.as_str()).collect::<Vec<_>>());
    }
}

#[test]
fn concurrent_observe_sees_each_prior_exactly_once() {
    let idx = Arc::new(KnownIndex::new());
    let mut handles = Vec::new();
    for t in 0..4 {
        let idx = Arc::clone(&idx);
        handles.push(std::thread::spawn(move || {
            let mut first_seen = 0usize;
            for n in 0..200 {
                if idx.observe("pods", &format!("ns/p{}", n), &format!("{}", t)).is_none() {
                    first_seen += 1;
                }
            }
            first_seen
        }));
    }
    let total_first: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    // the read-then-write is atomic: each key is "new" for exactly one thread
    assert_eq!(total_first, 200);
    assert_eq!(idx.len_for("pods"), 200);
    assert!(matches!(idx.get("pods", "ns/p0"), Some(KnownVersion::Observed(_))));
}
