use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;
use serde_json::Value;

use crate::test_utils::test_context;
use crate::AccessLevel;
use crate::BindOptions;
use crate::ChangeKind;
use crate::ComputeError;
use crate::EntryOptions;
use crate::Error;
use crate::EventType;
use crate::HandlerError;
use crate::MemoryAdapter;
use crate::MockPersistenceAdapter;
use crate::PersistenceAdapter;
use crate::PersistenceError;
use crate::PersistenceKind;
use crate::ValidationError;
use crate::WatchOptions;

#[tokio::test]
async fn test_read_after_write() {
    let context = test_context();
    let store = context.store();

    assert_eq!(store.get("user.name").await.expect("get"), None);
    assert_eq!(
        store.get_or("user.name", json!("anonymous")).await.expect("get_or"),
        json!("anonymous")
    );

    store.set("user.name", json!("ada"), "test").await.expect("set");
    assert_eq!(store.get("user.name").await.expect("get"), Some(json!("ada")));

    store.set("user.name", json!("grace"), "test").await.expect("overwrite");
    assert_eq!(store.get("user.name").await.expect("get"), Some(json!("grace")));

    assert!(store.delete("user.name", "test").await.expect("delete"));
    assert_eq!(store.get("user.name").await.expect("get"), None);
}

#[tokio::test]
async fn test_metadata_versioning() {
    let context = test_context();
    let store = context.store();

    store.set("counter", json!(1), "test").await.expect("set");
    let metadata = store.entry_metadata("counter").expect("metadata");
    assert_eq!(metadata.version, 1);

    store.set("counter", json!(2), "test").await.expect("set");
    let metadata = store.entry_metadata("counter").expect("metadata");
    assert_eq!(metadata.version, 2);
    assert!(metadata.updated_at >= metadata.created_at);
}

#[tokio::test]
async fn test_update_deep_merges_objects() {
    let context = test_context();
    let store = context.store();

    store
        .set("ui", json!({"theme": {"color": "red", "size": 12}, "lang": "en"}), "test")
        .await
        .expect("set");
    store
        .update("ui", json!({"theme": {"color": "blue"}}), "test")
        .await
        .expect("update");

    assert_eq!(
        store.get("ui").await.expect("get"),
        Some(json!({"theme": {"color": "blue", "size": 12}, "lang": "en"}))
    );

    let records = store.history(Some("ui"), 1);
    assert_eq!(records[0].kind, ChangeKind::Merge);

    // non-object partial replaces
    store.update("ui", json!("plain"), "test").await.expect("replace");
    assert_eq!(store.get("ui").await.expect("get"), Some(json!("plain")));
    assert_eq!(store.history(Some("ui"), 1)[0].kind, ChangeKind::Replace);
}

#[tokio::test]
async fn test_delete_absent_path() {
    let context = test_context();
    assert!(!context.store().delete("no.such.path", "test").await.expect("delete"));
}

#[tokio::test]
async fn test_read_only_entry_rejects_mutation() {
    let context = test_context();
    let store = context.store();

    store
        .set_with_options(
            "app.build",
            json!("1.0.0"),
            "test",
            EntryOptions {
                access: AccessLevel::ReadOnly,
                ..Default::default()
            },
        )
        .await
        .expect("initial write");

    let err = store.set("app.build", json!("2.0.0"), "test").await.expect_err("set");
    assert!(matches!(err, Error::Validation(ValidationError::ReadOnlyPath(_))));

    let err = store.delete("app.build", "test").await.expect_err("delete");
    assert!(matches!(err, Error::Validation(ValidationError::ReadOnlyPath(_))));

    assert_eq!(store.get("app.build").await.expect("get"), Some(json!("1.0.0")));
}

#[tokio::test]
async fn test_validator_rejection_leaves_no_trace() {
    let context = test_context();
    let store = context.store();

    store.add_validator(
        "user.age",
        "non_negative",
        Arc::new(|value: &Value| value.as_i64().map_or(false, |n| n >= 0)),
    );

    let err = store.set("user.age", json!(-5), "test").await.expect_err("set");
    match err {
        Error::Validation(ValidationError::Rejected { validator, .. }) => {
            assert_eq!(validator, "non_negative");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // no partial write, no change record, no event
    assert_eq!(store.get("user.age").await.expect("get"), None);
    assert!(store.history(Some("user.age"), 10).is_empty());
    assert!(context.bus().history(Some(EventType::StateChanged), None, 10).is_empty());

    store.set("user.age", json!(30), "test").await.expect("valid write");
    let metadata = store.entry_metadata("user.age").expect("metadata");
    assert_eq!(metadata.validators, vec!["non_negative".to_string()]);
}

#[tokio::test]
async fn test_rejected_create_releases_lock_slot() {
    let context = test_context();
    let store = context.store();
    store.add_validator("draft.title", "never", Arc::new(|_| false));

    for _ in 0..3 {
        let err = store.set("draft.title", json!("x"), "test").await.expect_err("set");
        assert!(matches!(err, Error::Validation(ValidationError::Rejected { .. })));
    }
    // the path never came alive, so no lock slot may linger
    assert_eq!(store.lock_slots(), 0);

    // a rejected update keeps the live path's slot and its value
    store.set("counter", json!(1), "test").await.expect("set");
    store.add_validator("counter", "never", Arc::new(|_| false));
    store.set("counter", json!(2), "test").await.expect_err("rejected update");
    assert_eq!(store.get("counter").await.expect("get"), Some(json!(1)));
    assert_eq!(store.lock_slots(), 1);
}

#[tokio::test]
async fn test_computed_is_adult_scenario() {
    let context = test_context();
    let store = context.store();
    let recomputes = Arc::new(AtomicU32::new(0));

    let counter = recomputes.clone();
    store
        .register_computed(
            "user.isAdult",
            vec!["user.age".to_string()],
            Arc::new(move |deps| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!(deps["user.age"].as_i64().unwrap_or(0) >= 18))
            }),
            true,
        )
        .expect("register");

    store.set("user.age", json!(10), "test").await.expect("set");
    assert_eq!(store.get("user.isAdult").await.expect("get"), Some(json!(false)));

    store.set("user.age", json!(20), "test").await.expect("set");
    assert_eq!(store.get("user.isAdult").await.expect("get"), Some(json!(true)));

    // one compute per read, none in between
    assert_eq!(recomputes.load(Ordering::SeqCst), 2);

    // cached read does not recompute
    assert_eq!(store.get("user.isAdult").await.expect("get"), Some(json!(true)));
    assert_eq!(recomputes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_computed_path_rejects_direct_writes() {
    let context = test_context();
    let store = context.store();

    store
        .register_computed("derived", vec!["base".to_string()], Arc::new(|_| Ok(json!(1))), true)
        .expect("register");

    let err = store.set("derived", json!(2), "test").await.expect_err("set");
    assert!(matches!(err, Error::Validation(ValidationError::ComputedPath(_))));
    let err = store.delete("derived", "test").await.expect_err("delete");
    assert!(matches!(err, Error::Validation(ValidationError::ComputedPath(_))));

    assert!(store.unregister_computed("derived"));
    store.set("derived", json!(2), "test").await.expect("plain write after unregister");
}

#[tokio::test]
async fn test_computed_cycle_rejected_via_store() {
    let context = test_context();
    let store = context.store();

    store
        .register_computed("b", vec!["a".to_string()], Arc::new(|_| Ok(json!(0))), true)
        .expect("register b");
    let err = store
        .register_computed("a", vec!["b".to_string()], Arc::new(|_| Ok(json!(0))), true)
        .expect_err("cycle");
    assert!(matches!(err, Error::Compute(ComputeError::CycleDetected { .. })));
}

#[tokio::test]
async fn test_watcher_fires_on_store_write() {
    let context = test_context();
    let store = context.store();

    let seen: Arc<parking_lot::Mutex<Vec<(String, Option<Value>)>>> =
        Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = seen.clone();
    store.watch(
        "ui",
        Arc::new(move |event| {
            sink.lock().push((event.path, event.new_value));
            Ok(())
        }),
        WatchOptions::default(),
    );

    store.set("ui.theme", json!("dark"), "test").await.expect("set");
    store.set("settings.lang", json!("en"), "test").await.expect("set unrelated");

    let events = seen.lock().clone();
    assert_eq!(events, vec![("ui.theme".to_string(), Some(json!("dark")))]);
}

#[tokio::test]
async fn test_watcher_can_write_back_without_deadlock() {
    let context = test_context();
    let store = context.store().clone();

    let writer = store.clone();
    store.watch(
        "input.raw",
        Arc::new(move |event| {
            let Some(value) = event.new_value else {
                return Ok(());
            };
            let text = value.as_str().unwrap_or_default().to_lowercase();
            let store = writer.clone();
            tokio::spawn(async move {
                let _ = store.set("input.normalized", json!(text), "normalizer").await;
            });
            Ok(())
        }),
        WatchOptions::default(),
    );

    store.set("input.raw", json!("HeLLo"), "test").await.expect("set");
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if store.get("input.normalized").await.expect("get") == Some(json!("hello")) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("normalized value should appear");
}

#[tokio::test]
async fn test_bidirectional_binding_cycle_safety() {
    let context = test_context();
    let store = context.store();

    store
        .bind(
            "form.email",
            "profile.email",
            BindOptions {
                bidirectional: true,
                ..Default::default()
            },
        )
        .await;

    store.set("form.email", json!("a@b.c"), "test").await.expect("set");
    assert_eq!(store.get("profile.email").await.expect("get"), Some(json!("a@b.c")));

    // exactly one write landed on the source: no echo from the target leg
    assert_eq!(store.history(Some("form.email"), 10).len(), 1);
    assert_eq!(store.history(Some("profile.email"), 10).len(), 1);

    // and the reverse direction works symmetrically
    store.set("profile.email", json!("x@y.z"), "test").await.expect("set");
    assert_eq!(store.get("form.email").await.expect("get"), Some(json!("x@y.z")));
    assert_eq!(store.history(Some("profile.email"), 10).len(), 2);
    assert_eq!(store.history(Some("form.email"), 10).len(), 2);
}

#[tokio::test]
async fn test_binding_initial_application_and_transform() {
    let context = test_context();
    let store = context.store();

    store.set("celsius", json!(100.0), "test").await.expect("set");
    store
        .bind(
            "celsius",
            "fahrenheit",
            BindOptions {
                transform: Some(Arc::new(|value: &Value| {
                    let c = value.as_f64().ok_or_else(|| HandlerError::new("not a number"))?;
                    Ok(json!(c * 9.0 / 5.0 + 32.0))
                })),
                ..Default::default()
            },
        )
        .await;

    // current source value applied once at bind time
    assert_eq!(store.get("fahrenheit").await.expect("get"), Some(json!(212.0)));

    store.set("celsius", json!(0.0), "test").await.expect("set");
    assert_eq!(store.get("fahrenheit").await.expect("get"), Some(json!(32.0)));
}

#[tokio::test]
async fn test_unbound_binding_stops_propagating() {
    let context = test_context();
    let store = context.store();

    let id = store.bind("a", "b", BindOptions::default()).await;
    store.set("a", json!(1), "test").await.expect("set");
    assert_eq!(store.get("b").await.expect("get"), Some(json!(1)));

    assert!(store.unbind(&id));
    store.set("a", json!(2), "test").await.expect("set");
    assert_eq!(store.get("b").await.expect("get"), Some(json!(1)));
}

#[tokio::test]
async fn test_disabled_binding_can_be_reenabled() {
    let context = test_context();
    let store = context.store();

    let id = store.bind("a", "b", BindOptions::default()).await;
    assert!(store.set_binding_enabled(&id, false));

    store.set("a", json!(1), "test").await.expect("set");
    assert_eq!(store.get("b").await.expect("get"), None);

    assert!(store.set_binding_enabled(&id, true));
    store.set("a", json!(2), "test").await.expect("set");
    assert_eq!(store.get("b").await.expect("get"), Some(json!(2)));

    assert!(!store.set_binding_enabled("unknown", true));
}

#[tokio::test]
async fn test_persistence_failure_is_best_effort() {
    let context = test_context();

    let mut mock = MockPersistenceAdapter::new();
    mock.expect_kind().return_const(PersistenceKind::File);
    mock.expect_save()
        .returning(|_, _, _| Err(PersistenceError::Backend("disk full".to_string())));
    context.register_adapter(Arc::new(mock));

    let store = context.store();
    store
        .set_with_options(
            "doc.title",
            json!("draft"),
            "test",
            EntryOptions {
                persistence: PersistenceKind::File,
                ..Default::default()
            },
        )
        .await
        .expect("write must succeed despite persistence failure");

    assert_eq!(store.get("doc.title").await.expect("get"), Some(json!("draft")));
}

#[tokio::test]
async fn test_persistence_routing_on_write_and_delete() {
    let context = test_context();
    let adapter = Arc::new(MemoryAdapter::new(PersistenceKind::Session));
    context.register_adapter(adapter.clone());

    let store = context.store();
    store
        .set_with_options(
            "session.token",
            json!("abc"),
            "test",
            EntryOptions {
                persistence: PersistenceKind::Session,
                ..Default::default()
            },
        )
        .await
        .expect("set");
    assert_eq!(adapter.load("session.token").expect("load"), Some(json!("abc")));

    // in-memory entries are never routed
    store.set("volatile", json!(1), "test").await.expect("set");
    assert_eq!(adapter.load("volatile").expect("load"), None);

    store.delete("session.token", "test").await.expect("delete");
    assert_eq!(adapter.load("session.token").expect("load"), None);
}

#[tokio::test]
async fn test_load_persisted_reads_back_through_adapter() {
    let context = test_context();
    context.register_adapter(Arc::new(MemoryAdapter::new(PersistenceKind::Session)));
    let store = context.store();

    store
        .set_with_options(
            "session.token",
            json!("abc"),
            "test",
            EntryOptions {
                persistence: PersistenceKind::Session,
                ..Default::default()
            },
        )
        .await
        .expect("set");

    assert_eq!(
        store.load_persisted("session.token", PersistenceKind::Session).expect("load"),
        Some(json!("abc"))
    );
    assert_eq!(store.load_persisted("ghost", PersistenceKind::Session).expect("load"), None);

    let err = store.load_persisted("x", PersistenceKind::File).expect_err("no adapter");
    assert!(matches!(err, Error::Persistence(PersistenceError::AdapterMissing(_))));
}

#[tokio::test]
async fn test_state_changed_event_payload() {
    let context = test_context();
    let store = context.store();

    store.set("ui.theme", json!("dark"), "designer").await.expect("set");

    let events = context.bus().history(Some(EventType::StateChanged), None, 10);
    assert_eq!(events.len(), 1);
    let payload = &events[0].payload;
    assert_eq!(payload["path"], json!("ui.theme"));
    assert_eq!(payload["old_value"], Value::Null);
    assert_eq!(payload["new_value"], json!("dark"));
    assert_eq!(payload["source"], json!("designer"));
    assert!(payload["change_id"].is_string());

    store.delete("ui.theme", "designer").await.expect("delete");
    let deleted = context.bus().history(Some(EventType::StateDeleted), None, 10);
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].payload["old_value"], json!("dark"));
}

#[tokio::test]
async fn test_computed_invalidated_event() {
    let context = test_context();
    let store = context.store();

    store
        .register_computed(
            "stats.total",
            vec!["stats.a".to_string()],
            Arc::new(|deps| Ok(deps["stats.a"].clone())),
            true,
        )
        .expect("register");

    store.set("stats.a", json!(5), "test").await.expect("set");

    let events = context.bus().history(Some(EventType::ComputedInvalidated), None, 10);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["invalidated"], json!(["stats.total"]));
}

#[tokio::test]
async fn test_reset_clears_all_entries() {
    let context = test_context();
    let store = context.store();

    store.set("a", json!(1), "test").await.expect("set");
    store.set("b.c", json!(2), "test").await.expect("set");

    let removed = store.reset("test").await.expect("reset");
    assert_eq!(removed, 2);
    assert_eq!(store.get("a").await.expect("get"), None);
    assert_eq!(store.get("b.c").await.expect("get"), None);

    let resets: Vec<_> = store
        .history(None, 10)
        .into_iter()
        .filter(|record| record.kind == ChangeKind::Reset)
        .collect();
    assert_eq!(resets.len(), 2);
}

#[tokio::test]
async fn test_empty_path_rejected() {
    let context = test_context();
    let err = context.store().set("", json!(1), "test").await.expect_err("set");
    assert!(matches!(err, Error::Validation(ValidationError::InvalidPath(_))));
}
