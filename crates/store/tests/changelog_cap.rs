#![forbid(unsafe_code)]

use chrono::Utc;
use kmon_core::{ChangeRecord, EventType, CHANGE_LOG_CAP};
use kmon_store::ChangeLog;

fn rec(n: usize) -> ChangeRecord {
    ChangeRecord {
        id: format!("evt-{}", n),
        timestamp: Utc::now(),
        event_type: EventType::Added,
        resource_type: "pods".to_string(),
        namespace: "ns".to_string(),
        name: format!("pod-{}", n),
        details: String::new(),
        is_read: false,
    }
}

#[test]
fn fifteen_hundred_events_keep_latest_thousand_in_order() {
    let log = ChangeLog::new(Utc::now());
    for n in 1..=1500 {
        log.append(rec(n));
    }
    let all = log.list();
    assert_eq!(all.len(), CHANGE_LOG_CAP);
    assert_eq!(all.first().map(|r| r.id.as_str()), Some("evt-501"));
    assert_eq!(all.last().map(|r| r.id.as_str()), Some("evt-1500"));
    // arrival order preserved
    for (i, r) in all.iter().enumerate() {
        assert_eq!(r.id, format!("evt-{}", 501 + i));
    }
    assert_eq!(log.stats().total, CHANGE_LOG_CAP);
}

#[test]
fn exactly_cap_records_evict_nothing() {
    let log = ChangeLog::new(Utc::now());
    for n in 1..=CHANGE_LOG_CAP {
        log.append(rec(n));
    }
    assert_eq!(log.list()[0].id, "evt-1");
    log.append(rec(CHANGE_LOG_CAP + 1));
    assert_eq!(log.list()[0].id, "evt-2");
}
