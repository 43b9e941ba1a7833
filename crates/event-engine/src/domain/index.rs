//! # Topic Index
//!
//! Routing core: topic name → ranked subscribers and execution stage.
//!
//! ## Caching
//!
//! Resolved [`TopicData`] is memoized per topic name and attached to the
//! [`Topic`] handle it was resolved for. Any change to the subscriber set,
//! the stage mapping or the executor factory bumps the index generation and
//! drops the whole cache; wildcard fan-out makes targeted invalidation
//! error-prone. Topic handles holding data from an older generation discard
//! it on their next lookup.
//!
//! ## Locking
//!
//! `routes` is always taken before `cache`. Mutations hold the `routes`
//! write lock while clearing the cache, and lookups hold the `routes` read
//! lock while inserting, so a computed entry can never outlive the
//! generation it was computed under. No lock is held while the executor
//! factory runs.
//!
//! The cache holds at most `cache_capacity` names; inserting past that
//! drops it whole.

use crate::config::DEFAULT_TOPIC_CACHE_CAPACITY;
use crate::domain::subscription::{SubscriberId, SubscriptionHolder};
use crate::domain::topic::{wildcard_candidates, Topic, TopicPatterns};
use crate::metrics;
use crate::ports::outbound::{ExecutorFactory, StageExecutor};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Resolved routing for one topic name. Immutable once computed.
pub struct TopicData {
    topic_name: String,
    subscribers: Vec<Arc<SubscriptionHolder>>,
    stage: String,
    executor: Option<Arc<dyn StageExecutor>>,
}

impl TopicData {
    #[must_use]
    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    /// Subscribers in dispatch order.
    #[must_use]
    pub fn subscribers(&self) -> &[Arc<SubscriptionHolder>] {
        &self.subscribers
    }

    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Executor of the stage, if the factory had one.
    #[must_use]
    pub fn executor(&self) -> Option<&Arc<dyn StageExecutor>> {
        self.executor.as_ref()
    }
}

impl fmt::Debug for TopicData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<SubscriberId> = self.subscribers.iter().map(|h| h.id()).collect();
        f.debug_struct("TopicData")
            .field("topic_name", &self.topic_name)
            .field("subscribers", &ids)
            .field("stage", &self.stage)
            .field("has_executor", &self.executor.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Routes {
    holders: HashMap<SubscriberId, Arc<SubscriptionHolder>>,
    discrete: HashMap<String, BTreeSet<SubscriberId>>,
    wildcard: HashMap<String, BTreeSet<SubscriberId>>,
    /// Stage name → its parsed topic patterns.
    stages: HashMap<String, TopicPatterns>,
    stage_discrete: HashMap<String, String>,
    stage_wildcard: HashMap<String, String>,
    executor_factory: Option<Arc<dyn ExecutorFactory>>,
    generation: u64,
}

impl Routes {
    fn link(&mut self, holder: &SubscriptionHolder) {
        for topic in holder.discrete_topics() {
            self.discrete.entry(topic.clone()).or_default().insert(holder.id());
        }
        for prefix in holder.wildcard_prefixes() {
            self.wildcard.entry(prefix.clone()).or_default().insert(holder.id());
        }
    }

    fn unlink(&mut self, holder: &SubscriptionHolder) {
        let id = holder.id();
        for (map, keys) in [
            (&mut self.discrete, holder.discrete_topics()),
            (&mut self.wildcard, holder.wildcard_prefixes()),
        ] {
            for key in keys {
                if let Some(ids) = map.get_mut(key) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        map.remove(key);
                    }
                }
            }
        }
    }

    fn find_subscribers(&self, topic: &str) -> Vec<Arc<SubscriptionHolder>> {
        let mut ids: BTreeSet<SubscriberId> = BTreeSet::new();
        if let Some(found) = self.discrete.get(topic) {
            ids.extend(found);
        }
        for prefix in wildcard_candidates(topic) {
            if let Some(found) = self.wildcard.get(prefix) {
                ids.extend(found);
            }
        }

        let mut holders: Vec<Arc<SubscriptionHolder>> = ids
            .iter()
            .filter_map(|id| self.holders.get(id).cloned())
            .collect();
        holders.sort_by(|a, b| a.priority_cmp(b));
        holders
    }

    fn resolve_stage(&self, topic: &str) -> Option<&str> {
        if let Some(stage) = self.stage_discrete.get(topic) {
            return Some(stage);
        }
        wildcard_candidates(topic).find_map(|prefix| self.stage_wildcard.get(prefix).map(String::as_str))
    }

    fn rebuild_stage_maps(&mut self) {
        self.stage_discrete.clear();
        self.stage_wildcard.clear();
        // Sorted so overlapping claims resolve the same way every time.
        let mut stages: Vec<(&String, &TopicPatterns)> = self.stages.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, patterns) in stages {
            for topic in &patterns.discrete {
                self.stage_discrete.entry(topic.clone()).or_insert_with(|| stage.clone());
            }
            for prefix in &patterns.wildcard {
                self.stage_wildcard.entry(prefix.clone()).or_insert_with(|| stage.clone());
            }
        }
    }
}

/// Subscriber and stage routing with per-topic memoization.
pub struct TopicIndex {
    routes: RwLock<Routes>,
    cache: RwLock<HashMap<String, Arc<TopicData>>>,
    cache_capacity: usize,
    default_stage: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TopicIndex {
    #[must_use]
    pub fn new(default_stage: impl Into<String>) -> Self {
        Self {
            routes: RwLock::new(Routes::default()),
            cache: RwLock::new(HashMap::new()),
            cache_capacity: DEFAULT_TOPIC_CACHE_CAPACITY,
            default_stage: default_stage.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Bound the number of memoized topic names. Past it the cache is
    /// dropped and refilled.
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn default_stage(&self) -> &str {
        &self.default_stage
    }

    /// Add (or replace) a subscriber.
    pub fn add_subscriber(&self, holder: Arc<SubscriptionHolder>) {
        let mut routes = self.routes.write();
        if let Some(previous) = routes.holders.remove(&holder.id()) {
            routes.unlink(&previous);
        }
        routes.link(&holder);
        debug!(
            subscriber = %holder.id(),
            discrete = holder.discrete_topics().len(),
            wildcard = holder.wildcard_prefixes().len(),
            "Subscriber indexed"
        );
        routes.holders.insert(holder.id(), holder);
        self.bump_generation(&mut routes);
    }

    /// Remove a subscriber, returning its holder if it was indexed.
    pub fn remove_subscriber(&self, id: SubscriberId) -> Option<Arc<SubscriptionHolder>> {
        let mut routes = self.routes.write();
        let holder = routes.holders.remove(&id)?;
        routes.unlink(&holder);
        self.bump_generation(&mut routes);
        debug!(subscriber = %id, "Subscriber removed from index");
        Some(holder)
    }

    #[must_use]
    pub fn subscriber(&self, id: SubscriberId) -> Option<Arc<SubscriptionHolder>> {
        self.routes.read().holders.get(&id).cloned()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.routes.read().holders.len()
    }

    /// Route topics matching `patterns` to `stage`, replacing the stage's
    /// previous mapping.
    ///
    /// When two stages claim the same pattern, the stage whose name sorts
    /// first wins.
    pub fn set_stage_topics<I, S>(&self, stage: &str, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = TopicPatterns::parse(patterns);
        let mut routes = self.routes.write();
        if parsed.is_empty() {
            routes.stages.remove(stage);
        } else {
            routes.stages.insert(stage.to_owned(), parsed);
        }
        routes.rebuild_stage_maps();
        self.bump_generation(&mut routes);
        debug!(stage, "Stage topics updated");
    }

    /// Drop a stage's topic mapping. Returns `false` if it had none.
    pub fn remove_stage(&self, stage: &str) -> bool {
        let mut routes = self.routes.write();
        if routes.stages.remove(stage).is_none() {
            return false;
        }
        routes.rebuild_stage_maps();
        self.bump_generation(&mut routes);
        true
    }

    pub fn set_executor_factory(&self, factory: Option<Arc<dyn ExecutorFactory>>) {
        let mut routes = self.routes.write();
        routes.executor_factory = factory;
        self.bump_generation(&mut routes);
    }

    /// Subscribers for `topic` in dispatch order (never cached).
    #[must_use]
    pub fn find_subscribers(&self, topic: &str) -> Vec<Arc<SubscriptionHolder>> {
        self.routes.read().find_subscribers(topic)
    }

    /// Stage for `topic`: exact match, else longest wildcard prefix, else the
    /// default stage.
    #[must_use]
    pub fn resolve_stage(&self, topic: &str) -> String {
        self.routes
            .read()
            .resolve_stage(topic)
            .unwrap_or(&self.default_stage)
            .to_owned()
    }

    /// Memoized routing data for `name`, attached to `topic` when given.
    ///
    /// The executor factory is consulted without any index lock held, so it
    /// may call back into the index. Data computed while the index changed
    /// underneath is returned but not memoized.
    pub fn topic_data(&self, topic: Option<&Topic>, name: &str) -> Arc<TopicData> {
        let (generation, subscribers, stage, factory) = {
            let routes = self.routes.read();
            if let Some(data) = topic.and_then(|t| t.cached(routes.generation)) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return data;
            }
            let cached = self.cache.read().get(name).cloned();
            if let Some(data) = cached {
                self.hits.fetch_add(1, Ordering::Relaxed);
                if let Some(topic) = topic {
                    topic.attach(routes.generation, data.clone());
                }
                return data;
            }
            let stage = routes
                .resolve_stage(name)
                .unwrap_or(&self.default_stage)
                .to_owned();
            (
                routes.generation,
                routes.find_subscribers(name),
                stage,
                routes.executor_factory.clone(),
            )
        };

        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_topic_cache_miss();
        let executor = factory.and_then(|factory| factory.executor(&stage));
        debug!(
            topic = name,
            stage = %stage,
            subscribers = subscribers.len(),
            has_executor = executor.is_some(),
            "Resolved topic routing"
        );
        let computed = Arc::new(TopicData {
            topic_name: name.to_owned(),
            subscribers,
            stage,
            executor,
        });

        let routes = self.routes.read();
        if routes.generation != generation {
            debug!(topic = name, "Routing changed during resolution; not memoized");
            return computed;
        }
        let data = {
            let mut cache = self.cache.write();
            if cache.len() >= self.cache_capacity && !cache.contains_key(name) {
                debug!(entries = cache.len(), "Topic cache full; dropping it");
                cache.clear();
            }
            cache.entry(name.to_owned()).or_insert(computed).clone()
        };
        if let Some(topic) = topic {
            topic.attach(routes.generation, data.clone());
        }
        data
    }

    /// Drop every memoized entry, e.g. after an executor factory changed
    /// its stage mapping.
    pub fn invalidate(&self) {
        let mut routes = self.routes.write();
        self.bump_generation(&mut routes);
    }

    fn bump_generation(&self, routes: &mut Routes) {
        routes.generation += 1;
        self.cache.write().clear();
    }

    /// Current invalidation generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.routes.read().generation
    }

    /// Number of memoized topic entries.
    #[must_use]
    pub fn cached_topics(&self) -> usize {
        self.cache.read().len()
    }

    #[must_use]
    pub fn cache_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn cache_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
