//! # Staging Scenarios
//!
//! Stage resolution from configuration and asynchronous delivery through
//! tokio-backed stage executors.

use super::harness::{new_log, props, Harness};
use event_engine::adapters::{StageExecutors, TokioStageExecutor};
use event_engine::ports::Task;
use event_engine::{
    CurrentEvent, DispatchStatus, EngineConfig, EngineError, EngineResult, Event, Properties,
    StageExecutor,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn staged_config() -> EngineConfig {
    EngineConfig::default()
        .with_stage("org", ["org/*"])
        .with_stage("Apache", ["org/apache/*"])
}

#[test]
fn test_stage_resolution_from_config() {
    let h = Harness::new(staged_config());
    let index = h.engine.index();

    assert_eq!(index.resolve_stage("com/foo"), "Default");
    assert_eq!(index.resolve_stage("org/eclipse/x"), "org");
    assert_eq!(index.resolve_stage("org/apache/ant"), "Apache");
    assert_eq!(index.resolve_stage("org/apache/felix/event"), "Apache");

    h.engine.set_stage_topics("Ant", ["org/apache/ant"]);
    assert_eq!(index.resolve_stage("org/apache/ant"), "Ant");
    assert_eq!(index.resolve_stage("org/apache/ant/sub"), "Apache");
}

#[test]
fn test_catch_all_stage_mapping() {
    let h = Harness::new(staged_config().with_stage("default", ["*"]));
    let index = h.engine.index();

    assert_eq!(index.resolve_stage("org/apache/ant"), "Apache");
    assert_eq!(index.resolve_stage("org/junit/test"), "org");
    assert_eq!(index.resolve_stage("com/example/Topic1"), "default");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_post_runs_on_stage_executor() {
    let h = Harness::new(staged_config());
    let executors = Arc::new(StageExecutors::new());
    for stage in ["Default", "org", "Apache"] {
        executors.insert(stage, Arc::new(TokioStageExecutor::current(stage).unwrap()));
    }
    h.engine.set_executor_factory(Some(executors.clone()));

    let caller = thread::current().id();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    h.registry
        .subscribe(
            ["org/*"],
            Arc::new(move |event: &Event| -> anyhow::Result<()> {
                let current = CurrentEvent::current().map(|e| e.id());
                sink.lock().push((
                    event.topic_name().to_owned(),
                    thread::current().id(),
                    current == Some(event.id()),
                ));
                Ok(())
            }),
        )
        .unwrap();

    let first = h
        .engine
        .post_event("org/apache/ant", props(&[("n", 1)]))
        .unwrap();
    let second = h.engine.post_event("org/eclipse", props(&[("n", 2)])).unwrap();
    tokio::time::timeout(TIMEOUT, async {
        first.handle().completed().await;
        second.handle().completed().await;
    })
    .await
    .unwrap();

    assert_eq!(first.handle().status(), DispatchStatus::Done);
    assert_eq!(first.handle().delivered(), 1);
    let observed = observed.lock();
    assert_eq!(observed.len(), 2);
    for (_, thread, saw_current) in observed.iter() {
        assert_ne!(*thread, caller);
        assert!(saw_current);
    }
    assert!(first.event().is_sealed());
}

#[test]
fn test_post_without_executor_fails_but_send_works() {
    let h = Harness::new(staged_config());
    let log = new_log();
    h.record(&["org/*"], "sync", &log);

    let err = h
        .engine
        .post_event("org/apache/ant", Properties::new())
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::NoExecutor {
            stage: "Apache".into()
        }
    );
    assert!(log.lock().is_empty());

    h.engine
        .send_event("org/apache/ant", Properties::new())
        .unwrap();
    assert_eq!(*log.lock(), vec!["sync:org/apache/ant"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shut_down_executor_rejects_post() {
    let h = Harness::default();
    let executor = Arc::new(TokioStageExecutor::current("Default").unwrap());
    h.engine.set_executor_factory(Some(Arc::new(
        StageExecutors::new().with("Default", executor.clone() as Arc<dyn StageExecutor>),
    )));
    let log = new_log();
    h.record(&["jobs/*"], "job", &log);

    executor.shutdown();
    let err = h.engine.post_event("jobs/run", Properties::new()).unwrap_err();
    assert!(matches!(err, EngineError::ExecutorRejected { ref stage, .. } if stage == "Default"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(log.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_executor_map_change_after_refresh() {
    let h = Harness::new(staged_config());
    let executors = Arc::new(StageExecutors::new());
    h.engine.set_executor_factory(Some(executors.clone()));
    let log = new_log();
    h.record(&["org/*"], "org", &log);

    assert!(matches!(
        h.engine.post_event("org/eclipse", Properties::new()),
        Err(EngineError::NoExecutor { .. })
    ));

    executors.insert("org", Arc::new(TokioStageExecutor::current("org").unwrap()));
    h.engine.refresh_routing();
    let dispatch = h.engine.post_event("org/eclipse", Properties::new()).unwrap();
    tokio::time::timeout(TIMEOUT, dispatch.handle().completed())
        .await
        .unwrap();
    assert_eq!(*log.lock(), vec!["org:org/eclipse"]);
}

#[test]
fn test_removed_stage_falls_back_to_default() {
    let h = Harness::new(staged_config());
    let index = h.engine.index();
    assert_eq!(index.resolve_stage("org/apache/ant"), "Apache");

    assert!(h.engine.remove_stage("Apache"));
    assert!(!h.engine.remove_stage("Apache"));
    assert_eq!(index.resolve_stage("org/apache/ant"), "org");

    assert!(h.engine.remove_stage("org"));
    assert_eq!(index.resolve_stage("org/apache/ant"), "Default");
}

#[test]
fn test_cancelled_before_dispatch_delivers_nothing() {
    let h = Harness::default();
    let queued: Arc<Mutex<Vec<Task>>> = Arc::new(Mutex::new(Vec::new()));

    struct Deferred(Arc<Mutex<Vec<Task>>>);
    impl StageExecutor for Deferred {
        fn execute(&self, task: Task) -> EngineResult<()> {
            self.0.lock().push(task);
            Ok(())
        }
    }
    h.engine.set_executor_factory(Some(Arc::new(
        StageExecutors::new().with("Default", Arc::new(Deferred(queued.clone()))),
    )));
    let log = new_log();
    h.record(&["late"], "late", &log);

    let dispatch = h.engine.post_event("late", Properties::new()).unwrap();
    assert!(dispatch.cancel());
    assert!(dispatch.is_cancelled());
    for task in queued.lock().drain(..) {
        task();
    }
    assert!(log.lock().is_empty());
    assert!(!dispatch.cancel());
    assert!(dispatch.wait_timeout(Duration::from_millis(10)));
}

#[test]
fn test_post_to_stopped_runtime_cancels_dispatch() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let executor = TokioStageExecutor::new("Default", runtime.handle().clone());
    runtime.shutdown_background();

    let h = Harness::default();
    h.engine.set_executor_factory(Some(Arc::new(
        StageExecutors::new().with("Default", Arc::new(executor)),
    )));
    let log = new_log();
    h.record(&["jobs/*"], "job", &log);

    let dispatch = h.engine.post_event("jobs/run", Properties::new()).unwrap();
    assert!(dispatch.wait_timeout(Duration::from_millis(500)));
    assert!(dispatch.is_cancelled());
    assert!(log.lock().is_empty());
}
