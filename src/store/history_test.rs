use serde_json::json;

use crate::ChangeHistory;
use crate::ChangeKind;
use crate::ChangeRecord;

fn record(
    path: &str,
    n: u64,
) -> ChangeRecord {
    ChangeRecord {
        id: format!("c{}", n),
        path: path.to_string(),
        kind: ChangeKind::Update,
        old_value: None,
        new_value: Some(json!(n)),
        timestamp: n,
        source: "test".to_string(),
        version: n,
    }
}

#[test]
fn test_eviction_at_capacity() {
    let history = ChangeHistory::new(3);
    for n in 0..5 {
        history.append(record("a", n));
    }
    assert_eq!(history.len(), 3);

    let records = history.query(None, 10);
    // newest first, oldest two evicted
    assert_eq!(records[0].id, "c4");
    assert_eq!(records[2].id, "c2");
}

#[test]
fn test_query_by_path_and_limit() {
    let history = ChangeHistory::new(10);
    history.append(record("a", 1));
    history.append(record("b", 2));
    history.append(record("a", 3));
    history.append(record("a", 4));

    let records = history.query(Some("a"), 2);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "c4");
    assert_eq!(records[1].id, "c3");

    assert!(history.query(Some("missing"), 10).is_empty());
}
