//! # Delivery Scenarios
//!
//! Topic fan-out, ranked ordering, handler failure isolation, filters and
//! sealing, exercised through the registry the way a host would.

use super::harness::{new_log, props, recorder, Harness};
use event_engine::domain::TopicPatterns;
use event_engine::{
    EngineError, Event, EventHandler, LogLevel, Properties, ReservedKey, Topic,
};
use event_telemetry::event_span;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

// =============================================================================
// TOPIC FAN-OUT
// =============================================================================

#[test]
fn test_wildcard_fan_out() {
    let h = Harness::default();
    let received: Arc<Mutex<Vec<(String, Properties)>>> = Arc::new(Mutex::new(Vec::new()));

    let handler = |name: &'static str| -> Arc<dyn EventHandler> {
        let received = received.clone();
        Arc::new(move |event: &Event| -> anyhow::Result<()> {
            received
                .lock()
                .push((name.to_owned(), event.properties().to_map()));
            Ok(())
        })
    };
    h.registry
        .subscribe(["websphere/*", "all/*"], handler("A"))
        .unwrap();
    h.registry.subscribe(["osgi/*", "all/*"], handler("B")).unwrap();

    let expected = props(&[("property1", "value1"), ("property2", "value2")]);
    let dispatch = h.engine.send_event("all/Topic", expected.clone()).unwrap();
    assert!(dispatch.is_done());
    {
        let mut received = received.lock();
        received.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(received.len(), 2);
        assert_eq!(received[0], ("A".to_owned(), expected.clone()));
        assert_eq!(received[1], ("B".to_owned(), expected));
        received.clear();
    }

    h.engine
        .send_event("websphere/Topic", Properties::new())
        .unwrap();
    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "A");
}

#[test]
fn test_malformed_patterns_subscribe_to_nothing() {
    let h = Harness::default();
    let log = new_log();
    h.record(&["", "/x", "x/", "a//b"], "malformed", &log);

    for topic in ["x", "a/b", "a"] {
        h.engine.send_event(topic, Properties::new()).unwrap();
    }
    assert!(log.lock().is_empty());

    let parsed = TopicPatterns::parse(["", "/x", "x/", "a//b"]);
    assert!(parsed.is_empty());
}

#[test]
fn test_order_independent_of_registration_order() {
    let h = Harness::default();
    let log = new_log();
    h.registry
        .register(|r| r.with_topics(["a/*"]).with_ranking(-1), recorder(&log, "low"))
        .unwrap();
    h.record(&["a/b"], "first-default", &log);
    h.registry
        .register(|r| r.with_topics(["*"]).with_ranking(7), recorder(&log, "top"))
        .unwrap();
    h.record(&["a/*"], "second-default", &log);

    h.engine.send_event("a/b", Properties::new()).unwrap();
    assert_eq!(
        *log.lock(),
        vec!["top:a/b", "first-default:a/b", "second-default:a/b", "low:a/b"]
    );
}

// =============================================================================
// FAILURE ISOLATION
// =============================================================================

#[test]
fn test_failure_reported_and_dispatch_continues() {
    let h = Harness::default();
    let log = new_log();
    let failing = h
        .registry
        .register(
            |r| r.with_topics(["orders/*"]).with_ranking(10),
            Arc::new(|event: &Event| -> anyhow::Result<()> {
                anyhow::bail!("cannot process {}", event.topic_name())
            }),
        )
        .unwrap();
    h.record(&["orders/*"], "second", &log);

    let dispatch = h.engine.send_event("orders/new", Properties::new()).unwrap();
    assert!(dispatch.is_done());
    assert_eq!(*log.lock(), vec!["second:orders/new"]);

    let reports = h.sink.at_level(LogLevel::Warning);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].source, Some(failing));
    assert_eq!(
        reports[0].error.as_deref(),
        Some("cannot process orders/new")
    );
}

#[test]
fn test_handler_removed_from_table_is_reported_unavailable() {
    let h = Harness::default();
    let log = new_log();
    let id = h.record(&["t"], "gone", &log);
    h.registry.handlers().remove(id);

    h.engine.send_event("t", Properties::new()).unwrap();
    assert!(log.lock().is_empty());
    let warnings = h.sink.at_level(LogLevel::Warning);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].source, Some(id));
}

// =============================================================================
// FILTERS
// =============================================================================

#[test]
fn test_filters_over_typed_properties() {
    let h = Harness::default();
    let log = new_log();
    h.registry
        .register(
            |r| {
                r.with_topics(["metrics/*"])
                    .with_filter("(&(level>=3)(|(tags=urgent)(owner=ops*)))")
            },
            recorder(&log, "urgent"),
        )
        .unwrap();

    let mut low = Properties::new();
    low.insert("level".into(), json!(2));
    low.insert("tags".into(), json!(["urgent"]));
    h.engine.send_event("metrics/cpu", low).unwrap();

    let mut tagged = Properties::new();
    tagged.insert("LEVEL".into(), json!(5));
    tagged.insert("tags".into(), json!(["info", "urgent"]));
    h.engine.send_event("metrics/cpu", tagged).unwrap();

    let mut owned = Properties::new();
    owned.insert("level".into(), json!(3));
    owned.insert("owner".into(), json!("ops-team"));
    h.engine.send_event("metrics/disk", owned).unwrap();

    assert_eq!(*log.lock(), vec!["urgent:metrics/cpu", "urgent:metrics/disk"]);
}

// =============================================================================
// SEALING AND PROPERTIES
// =============================================================================

#[test]
fn test_delivered_event_is_sealed() {
    let h = Harness::default();
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let sink = attempts.clone();
    h.registry
        .subscribe(
            ["sealed"],
            Arc::new(move |event: &Event| -> anyhow::Result<()> {
                let mut attempts = sink.lock();
                attempts.push(event.set_property("k", "changed").is_err());
                attempts.push(event.set_properties([("k", "changed")]).is_err());
                attempts.push(event.properties().clear().is_err());
                attempts.push(event.properties().remove("k").is_err());
                attempts.push(event.get_property("k") == Some(json!("original")));
                Ok(())
            }),
        )
        .unwrap();

    h.engine
        .send_event("sealed", props(&[("k", "original")]))
        .unwrap();
    assert_eq!(*attempts.lock(), vec![true; 5]);
}

#[test]
fn test_both_addressing_modes_agree() {
    let h = Harness::default();
    let key = ReservedKey::new("integration.reserved");
    let event = h.engine.create_event("props/test").unwrap();

    event.set_property(&key, 42).unwrap();
    assert_eq!(event.get_property("integration.reserved"), Some(json!(42)));
    event.set_property("integration.reserved", 43).unwrap();
    assert_eq!(event.get_property(&key), Some(json!(43)));
    assert_eq!(event.get_property_as::<u32>(&key).unwrap(), Some(43));
    assert!(matches!(
        event.get_property_as::<String>(&key),
        Err(EngineError::TypeMismatch { .. })
    ));
    assert_eq!(event.get_property(&key), Some(json!(43)));
}

// =============================================================================
// ROUTING CACHE
// =============================================================================

#[test]
fn test_topic_instances_share_routing() {
    let h = Harness::default();
    let log = new_log();
    h.record(&["cache/*"], "a", &log);

    let first = Topic::new("cache/x").unwrap();
    let second = Topic::new("cache/x").unwrap();
    let index = h.engine.index();
    let d1 = index.topic_data(Some(&first), first.name());
    let d2 = index.topic_data(Some(&second), second.name());
    assert!(Arc::ptr_eq(&d1, &d2));

    h.record(&["cache/x"], "b", &log);
    let d3 = index.topic_data(Some(&first), first.name());
    assert!(!Arc::ptr_eq(&d1, &d3));
    assert_eq!(d3.subscribers().len(), 2);
}

// =============================================================================
// CONCURRENCY
// =============================================================================

#[test]
fn test_publish_while_registering() {
    let h = Arc::new(Harness::default());
    let delivered = Arc::new(AtomicUsize::new(0));

    let publishers: Vec<_> = (0..4)
        .map(|n| {
            let h = h.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    let topic = format!("load/{n}/{i}");
                    let dispatch = h.engine.send_event(&topic, Properties::new()).unwrap();
                    assert!(dispatch.is_done());
                }
            })
        })
        .collect();

    for _ in 0..20 {
        let delivered = delivered.clone();
        h.registry
            .subscribe(
                ["load/*"],
                Arc::new(move |event: &Event| -> anyhow::Result<()> {
                    let _span = event_span!("count", topic = event.topic_name()).entered();
                    delivered.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }),
            )
            .unwrap();
    }

    for publisher in publishers {
        publisher.join().unwrap();
    }

    let before = delivered.load(Ordering::Relaxed);
    h.engine.send_event("load/final", Properties::new()).unwrap();
    assert_eq!(delivered.load(Ordering::Relaxed), before + 20);
    assert!(h.sink.is_empty());
}
