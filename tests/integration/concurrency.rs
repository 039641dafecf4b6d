//! Concurrency and race condition tests
//!
//! These tests run on the multi-threaded runtime:
//! - At most one action executes at any time
//! - Subscription churn while dispatching

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use compose_monitor::{
    actions::{ActionEntry, ActionName, ActionRunner},
    dispatcher::Dispatcher,
};

use crate::helpers::*;

/// An executor recording how many instances overlap
fn overlap_tracking_runner(
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
) -> ActionRunner {
    let mut runner = ActionRunner::new();
    for action in ActionName::ALL {
        let running = running.clone();
        let max_running = max_running.clone();
        let completed = completed.clone();
        runner.register(
            action,
            ActionEntry::new(move |_service: String| {
                let running = running.clone();
                let max_running = max_running.clone();
                let completed = completed.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_running.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                }
            }),
        );
    }
    runner
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_flight_under_contention() {
    let running = Arc::new(AtomicUsize::new(0));
    let max_running = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let runner = Arc::new(overlap_tracking_runner(
        running.clone(),
        max_running.clone(),
        completed.clone(),
    ));

    for round in 0..20 {
        let handles: Vec<_> = ActionName::ALL
            .into_iter()
            .cycle()
            .take(8)
            .map(|action| runner.spawn_execute(action, format!("svc-{round}")))
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
    }

    assert_eq!(max_running.load(Ordering::SeqCst), 1);
    assert_eq!(running.load(Ordering::SeqCst), 0);
    let completed = completed.load(Ordering::SeqCst);
    assert!(completed >= 20, "each round runs at least once, got {completed}");
    assert!(!runner.is_busy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscription_churn_while_dispatching() {
    let (registry, _counters) = counting_registry(Duration::from_millis(1));
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));

    let mut workers = vec![];
    for i in 0..8 {
        let dispatcher = dispatcher.clone();
        workers.push(tokio::spawn(async move {
            for _ in 0..25 {
                let (client, rx) = dispatcher.connect().await;
                let topics: &[&str] = if i % 2 == 0 {
                    &["metrics", "status"]
                } else {
                    &["logs"]
                };
                dispatcher.subscribe(client, topics).await.unwrap();
                tokio::task::yield_now().await;
                if i % 3 == 0 {
                    // let the dispatcher find out on its own
                    drop(rx);
                } else {
                    dispatcher.disconnect(client).await;
                }
            }
        }));
    }

    let ticker = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                dispatcher.collect().await;
                dispatcher.dispatch_tick().await;
                tokio::task::yield_now().await;
            }
        })
    };

    for worker in workers {
        worker.await.unwrap();
    }
    ticker.await.unwrap();

    // receivers dropped after the last tick are noticed on the next one
    dispatcher.registry().run_due(None).await;
    dispatcher.dispatch_tick().await;

    assert_eq!(dispatcher.client_count().await, 0);
    assert!(dispatcher.active_topics().await.is_empty());
}
