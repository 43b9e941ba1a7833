//! # Event Engine Dispatch Benchmarks
//!
//! | Path | Expectation |
//! |------|-------------|
//! | `send_event` fan-out | Linear in matching subscribers |
//! | Topic routing, cached | One map lookup |
//! | Topic routing, after mutation | Full subscriber scan |
//! | Filter evaluation | Independent of subscriber count |

// Allow excessive nesting in benchmark code
#![allow(clippy::excessive_nesting)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use event_engine::adapters::{HandlerTable, InMemorySubscriberRegistry};
use event_engine::{EngineConfig, Event, EventEngine, Properties, Topic};
use rand::Rng;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn engine_with_subscribers(count: usize, topics: &[&str]) -> (Arc<EventEngine>, InMemorySubscriberRegistry) {
    let handlers = Arc::new(HandlerTable::new());
    let engine = Arc::new(
        EventEngine::new(EngineConfig::default(), handlers.clone()).expect("default config is valid"),
    );
    let registry = InMemorySubscriberRegistry::new(handlers, engine.clone());
    let counter = Arc::new(AtomicUsize::new(0));
    for i in 0..count {
        let counter = counter.clone();
        registry
            .subscribe(
                [topics[i % topics.len()]],
                Arc::new(move |_: &Event| -> anyhow::Result<()> {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }),
            )
            .expect("subscription accepted");
    }
    (engine, registry)
}

// ============================================================================
// Synchronous delivery
// ============================================================================

fn bench_send_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("send-event");
    group.measurement_time(Duration::from_secs(5));

    for size in [1, 10, 100, 500] {
        let (engine, _registry) = engine_with_subscribers(size, &["bench/*", "bench/topic", "*"]);
        let mut properties = Properties::new();
        properties.insert("sequence".into(), json!(1));

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("fan_out", size), &properties, |b, props| {
            b.iter(|| {
                let dispatch = engine
                    .send_event("bench/topic", props.clone())
                    .expect("send succeeds");
                black_box(dispatch.handle().delivered())
            })
        });
    }

    group.finish();
}

// ============================================================================
// Topic routing
// ============================================================================

fn bench_topic_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic-routing");

    let (engine, _registry) = engine_with_subscribers(1_000, &["org/*", "org/apache/*", "com/*", "*"]);
    let index = engine.index();
    let topic = Topic::new("org/apache/ant").expect("valid topic");

    group.bench_function("cached", |b| {
        index.topic_data(Some(&topic), topic.name());
        b.iter(|| black_box(index.topic_data(Some(&topic), topic.name()).subscribers().len()))
    });

    group.bench_function("after_invalidation", |b| {
        b.iter(|| {
            index.invalidate();
            black_box(index.topic_data(Some(&topic), topic.name()).subscribers().len())
        })
    });

    let mut rng = rand::thread_rng();
    let names: Vec<String> = (0..256)
        .map(|_| format!("org/apache/{}", rng.gen::<u32>()))
        .collect();
    group.bench_function("uncached_names", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % names.len();
            black_box(index.find_subscribers(&names[i]).len())
        })
    });

    group.finish();
}

// ============================================================================
// Filters
// ============================================================================

fn bench_filter_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters");

    let engine = EventEngine::new(EngineConfig::default(), Arc::new(HandlerTable::new()))
        .expect("default config is valid");
    let event = engine.create_event("bench/filter").expect("valid topic");
    event
        .set_properties([
            ("level", json!(4)),
            ("owner", json!("ops-team")),
            ("tags", json!(["urgent", "disk"])),
        ])
        .expect("unsealed event");
    let filter = event_engine::EventFilter::parse("(&(level>=3)(|(tags=urgent)(owner=ops*)))")
        .expect("valid filter");

    group.bench_function("compound", |b| b.iter(|| black_box(event.matches_filter(&filter))));
    group.finish();
}

criterion_group!(benches, bench_send_fan_out, bench_topic_routing, bench_filter_matching);
criterion_main!(benches);
