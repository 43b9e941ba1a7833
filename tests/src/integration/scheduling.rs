//! # Scheduling Scenarios
//!
//! Delayed and periodic events posted through the tokio scheduler onto a
//! tokio stage executor.

use super::harness::{props, Harness};
use event_engine::adapters::{StageExecutors, TokioScheduler, TokioStageExecutor};
use event_engine::{EngineError, Event, Properties, ScheduledEventService};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn scheduled_harness() -> (Harness, ScheduledEventService) {
    let h = Harness::default();
    h.engine.set_executor_factory(Some(Arc::new(StageExecutors::new().with(
        "Default",
        Arc::new(TokioStageExecutor::current("Default").unwrap()),
    ))));
    let service = ScheduledEventService::new(Arc::new(TokioScheduler::current().unwrap()));
    service.bind(h.engine.clone());
    (h, service)
}

async fn wait_until(check: impl Fn() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delayed_event_carries_properties() {
    let (h, service) = scheduled_harness();
    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    h.registry
        .subscribe(
            ["reports/*"],
            Arc::new(move |event: &Event| -> anyhow::Result<()> {
                sink.lock().push(event.get_property("kind").unwrap_or(Value::Null));
                Ok(())
            }),
        )
        .unwrap();

    service
        .schedule(
            "reports/daily",
            props(&[("kind", "daily")]),
            Duration::from_millis(10),
        )
        .unwrap();
    wait_until(|| !received.lock().is_empty()).await;
    assert_eq!(*received.lock(), vec![json!("daily")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fixed_rate_until_cancelled() {
    let (h, service) = scheduled_harness();
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    h.registry
        .subscribe(
            ["timer/tick"],
            Arc::new(move |_: &Event| -> anyhow::Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

    let handle = service
        .schedule_at_fixed_rate(
            "timer/tick",
            Properties::new(),
            Duration::ZERO,
            Duration::from_millis(10),
        )
        .unwrap();
    wait_until(|| ticks.load(Ordering::SeqCst) >= 3).await;

    assert!(handle.cancel());
    assert!(!handle.cancel());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = ticks.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), settled);
}

#[tokio::test]
async fn test_schedule_argument_errors() {
    let (_h, service) = scheduled_harness();
    assert!(matches!(
        service.schedule("", Properties::new(), Duration::ZERO),
        Err(EngineError::InvalidArgument { .. })
    ));
    assert!(matches!(
        service.schedule("bad//topic", Properties::new(), Duration::ZERO),
        Err(EngineError::InvalidTopic { .. })
    ));
    assert!(matches!(
        service.schedule_at_fixed_rate(
            "timer/tick",
            Properties::new(),
            Duration::ZERO,
            Duration::ZERO
        ),
        Err(EngineError::InvalidArgument { .. })
    ));

    assert!(service.unbind());
    assert!(matches!(
        service.schedule("timer/tick", Properties::new(), Duration::ZERO),
        Err(EngineError::IllegalState { .. })
    ));
}
