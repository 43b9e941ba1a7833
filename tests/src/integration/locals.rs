//! # Event Local Scenarios
//!
//! Locals flowing from an outer event into the events its handlers send,
//! the duplicate-declaration policy and the property slot table.

use super::harness::{new_log, Harness};
use event_engine::{
    CurrentEvent, DuplicateLocalPolicy, EngineConfig, EngineError, Event, Local, Properties,
    SlotRegistry,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn test_nested_send_inherits_locals() {
    let h = Arc::new(Harness::default());
    let user: Arc<Local<String>> = Arc::new(Local::named("user"));
    let seen = Arc::new(Mutex::new(Vec::new()));

    {
        let user = user.clone();
        let seen = seen.clone();
        h.registry
            .subscribe(
                ["audit/inner"],
                Arc::new(move |_: &Event| -> anyhow::Result<()> {
                    seen.lock().push(format!(
                        "inner depth={} user={:?}",
                        CurrentEvent::depth(),
                        user.get().as_deref().cloned()
                    ));
                    user.set("inner-override".to_owned())?;
                    Ok(())
                }),
            )
            .unwrap();
    }
    {
        let engine = h.engine.clone();
        let user = user.clone();
        let seen = seen.clone();
        h.registry
            .subscribe(
                ["audit/outer"],
                Arc::new(move |_: &Event| -> anyhow::Result<()> {
                    user.set("alice".to_owned())?;
                    engine.send_event("audit/inner", Properties::new())?;
                    seen.lock().push(format!(
                        "outer depth={} user={:?}",
                        CurrentEvent::depth(),
                        user.get().as_deref().cloned()
                    ));
                    Ok(())
                }),
            )
            .unwrap();
    }

    let dispatch = h.engine.send_event("audit/outer", Properties::new()).unwrap();
    assert_eq!(
        *seen.lock(),
        vec![
            "inner depth=2 user=Some(\"alice\")".to_owned(),
            "outer depth=1 user=Some(\"alice\")".to_owned(),
        ]
    );
    assert_eq!(CurrentEvent::depth(), 0);
    assert_eq!(
        dispatch.event().locals().get_by_name::<String>("user").as_deref(),
        Some(&"alice".to_owned())
    );
    assert!(h.sink.is_empty());
}

#[test]
fn test_event_created_inside_handler_has_child_store() {
    let h = Arc::new(Harness::default());
    let created = Arc::new(Mutex::new(None));
    {
        let engine = h.engine.clone();
        let created = created.clone();
        h.registry
            .subscribe(
                ["outer"],
                Arc::new(move |event: &Event| -> anyhow::Result<()> {
                    let child = engine.create_event("child")?;
                    let parent = child.locals().parent().cloned();
                    *created.lock() = Some(
                        parent.map_or(false, |p| Arc::ptr_eq(&p, event.locals())),
                    );
                    Ok(())
                }),
            )
            .unwrap();
    }

    h.engine.send_event("outer", Properties::new()).unwrap();
    assert_eq!(*created.lock(), Some(true));

    let standalone = h.engine.create_event("child").unwrap();
    assert!(standalone.locals().parent().is_none());
}

#[test]
fn test_reject_policy_refuses_live_duplicate() {
    let config = EngineConfig {
        duplicate_locals: DuplicateLocalPolicy::Reject,
        ..EngineConfig::default()
    };
    let h = Harness::new(config);
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = outcomes.clone();
    h.registry
        .subscribe(
            ["locals/declare"],
            Arc::new(move |_: &Event| -> anyhow::Result<()> {
                let mut outcomes = sink.lock();
                let first = Local::<u32>::declare("counter")?;
                first.set(1)?;
                let duplicate = Local::<u32>::declare("counter");
                outcomes.push(matches!(duplicate, Err(EngineError::DuplicateLocal { .. })));

                drop(first);
                let again = Local::<u32>::declare("counter")?;
                outcomes.push(again.get().as_deref() == Some(&1));
                Ok(())
            }),
        )
        .unwrap();

    let dispatch = h
        .engine
        .send_event("locals/declare", Properties::new())
        .unwrap();
    assert_eq!(dispatch.handle().failed(), 0);
    assert_eq!(*outcomes.lock(), vec![true, true]);
}

#[test]
fn test_allow_policy_accepts_duplicates() {
    let h = Harness::default();
    let log = new_log();
    let sink = log.clone();
    h.registry
        .subscribe(
            ["locals/allow"],
            Arc::new(move |_: &Event| -> anyhow::Result<()> {
                let _a = Local::<u32>::declare("dup")?;
                let _b = Local::<u32>::declare("dup")?;
                sink.lock().push("declared twice".to_owned());
                Ok(())
            }),
        )
        .unwrap();

    h.engine.send_event("locals/allow", Properties::new()).unwrap();
    assert_eq!(*log.lock(), vec!["declared twice"]);
}

#[test]
fn test_declare_outside_event_is_illegal() {
    assert!(matches!(
        Local::<u32>::declare("nowhere"),
        Err(EngineError::IllegalState { .. })
    ));
    assert!(Local::<u32>::named("nowhere").get().is_none());
}

#[test]
fn test_private_slot_registry() {
    let slots = SlotRegistry::new();
    assert!(slots.is_empty());

    let a = slots.reserve_slot("event.topics");
    let b = slots.reserve_slot("event.filter");
    assert_eq!((a, b), (0, 1));
    assert_eq!(slots.reserve_slot("event.topics"), a);
    assert_eq!(slots.slot_of("event.filter"), Some(b));
    assert_eq!(slots.name_of(b).as_deref(), Some("event.filter"));
    assert_eq!(slots.slot_of("unknown"), None);
    assert_eq!(slots.len(), 2);
}
