//! Interval-gated collectors and the cache of their latest values
//!
//! ## Message Flow
//!
//! ```text
//! collection tick → spawn_due(active topics) → one task per due collector → cache
//!                                                                             ↓
//!                                           dispatch tick → get(topic) ← ─ ─ ┘
//! ```
//!
//! Readers never trigger a poll. A poll that fails or yields nothing leaves the
//! previously cached value in place, so clients keep receiving the last good
//! snapshot until a fresh one lands. A collector whose poll is still running is
//! skipped, never awaited, so a hung producer only stalls its own topic.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, instrument, trace, warn};

use crate::topic::Topic;

/// A source of snapshot values for one topic
///
/// `Ok(None)` means "no data this round"; it is treated like a failure by the
/// cache, except that it is not logged as an error.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(&self) -> Result<Option<Value>>;
}

#[async_trait]
impl<F, Fut> Producer for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>>> + Send,
{
    async fn produce(&self) -> Result<Option<Value>> {
        (self)().await
    }
}

type Cache = Arc<RwLock<HashMap<Topic, Value>>>;

/// A producer paired with its minimum re-poll interval
pub struct Collector {
    topic: Topic,
    producer: Box<dyn Producer>,
    interval: Duration,
    /// Completion time of the last attempted poll (`None` = never polled)
    last_run: Mutex<Option<Instant>>,
    in_flight: AtomicBool,
}

/// Claims a collector's in-flight flag until the poll task holding it ends
struct PollGuard(Arc<Collector>);

impl PollGuard {
    fn acquire(collector: &Arc<Collector>) -> Option<Self> {
        collector
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PollGuard(Arc::clone(collector)))
    }
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

impl Collector {
    fn new(topic: Topic, producer: Box<dyn Producer>, interval: Duration) -> Self {
        Self {
            topic,
            producer,
            interval,
            last_run: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_run(&self) -> Option<Instant> {
        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a poll of this collector is currently running
    pub fn is_polling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// A collector is due once a full interval has elapsed since its last poll
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_run() {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    fn mark_run(&self, at: Instant) {
        let mut last_run = self.last_run.lock().unwrap_or_else(PoisonError::into_inner);
        // never move backwards, even if two polls overlap
        if last_run.is_none_or(|last| last < at) {
            *last_run = Some(at);
        }
    }

    /// Invoke the producer once and record the completion time
    async fn poll(&self) -> Option<Value> {
        trace!("polling {}", self.topic);

        let result = self.producer.produce().await;
        self.mark_run(Instant::now());

        match result {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                debug!("{}: producer returned no data, keeping cached value", self.topic);
                None
            }
            Err(e) => {
                warn!("{}: producer failed, keeping cached value: {:#}", self.topic, e);
                None
            }
        }
    }
}

/// Owns the registered collectors and the cache of their latest values
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: Vec<Arc<Collector>>,
    cache: Cache,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collector for `topic`
    ///
    /// The topic has no cached value until its first successful poll.
    pub fn register<P>(&mut self, topic: Topic, producer: P, interval: Duration)
    where
        P: Producer + 'static,
    {
        debug!("registering collector for {topic} every {interval:?}");
        self.collectors
            .push(Arc::new(Collector::new(topic, Box::new(producer), interval)));
    }

    /// The set of topics that have a collector
    pub fn topics(&self) -> HashSet<Topic> {
        self.collectors.iter().map(|collector| collector.topic).collect()
    }

    pub fn collectors(&self) -> &[Arc<Collector>] {
        &self.collectors
    }

    /// Start a poll task for every due, idle collector whose topic is in
    /// `topics` (all of them for `None`)
    ///
    /// Each task stores its own result when it completes. The caller may drop
    /// the handles; the polls keep running.
    #[instrument(skip_all)]
    pub fn spawn_due(&self, topics: Option<&HashSet<Topic>>) -> Vec<JoinHandle<()>> {
        let now = Instant::now();

        let handles: Vec<_> = self
            .collectors
            .iter()
            .filter(|collector| topics.is_none_or(|topics| topics.contains(&collector.topic)))
            .filter(|collector| collector.is_due(now))
            .filter_map(|collector| {
                let guard = PollGuard::acquire(collector);
                if guard.is_none() {
                    trace!("{}: previous poll still running", collector.topic);
                }
                guard
            })
            .map(|guard| {
                let cache = Arc::clone(&self.cache);
                tokio::spawn(async move {
                    let collector = &guard.0;
                    if let Some(value) = collector.poll().await {
                        cache.write().await.insert(collector.topic, value);
                        trace!("{}: cached fresh value", collector.topic);
                    }
                })
            })
            .collect();

        trace!("started {} polls", handles.len());
        handles
    }

    /// Like [`CollectorRegistry::spawn_due`], but wait for the started polls
    ///
    /// Polls that were already running when this was called are not awaited.
    pub async fn run_due(&self, topics: Option<&HashSet<Topic>>) {
        for result in join_all(self.spawn_due(topics)).await {
            if let Err(e) = result {
                error!("poll task ended abnormally: {e}");
            }
        }
    }

    /// The latest cached value for `topic`, if any poll has succeeded yet
    pub async fn get(&self, topic: Topic) -> Option<Value> {
        self.cache.read().await.get(&topic).cloned()
    }
}
