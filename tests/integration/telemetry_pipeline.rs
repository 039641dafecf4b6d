//! Collection and fan-out end to end, on a paused clock

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use compose_monitor::{
    Topic,
    collector::CollectorRegistry,
    dispatcher::Dispatcher,
    telemetry::TelemetryHandle,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::advance;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_status_polled_once_per_interval() {
    let (registry, counters) = counting_registry(Duration::from_secs(3));
    let dispatcher = Dispatcher::new(Arc::new(registry));
    let (client, mut rx) = dispatcher.connect().await;
    dispatcher.subscribe(client, &["status"]).await.unwrap();

    // t=0: never ran, so due
    dispatcher.collect().await;
    assert_eq!(calls_for(&counters, Topic::Status), 1);

    // t=2: inside the window
    advance(Duration::from_secs(2)).await;
    dispatcher.collect().await;
    assert_eq!(calls_for(&counters, Topic::Status), 1);

    // t=4: window elapsed
    advance(Duration::from_secs(2)).await;
    dispatcher.collect().await;
    assert_eq!(calls_for(&counters, Topic::Status), 2);

    // nobody asked for the other topics
    assert_eq!(calls_for(&counters, Topic::Metrics), 0);
    assert_eq!(calls_for(&counters, Topic::Logs), 0);

    dispatcher.dispatch_tick().await;
    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].to_json(),
        json!({ "event": "status", "data": { "topic": "status", "call": 1 } })
    );
}

#[tokio::test(start_paused = true)]
async fn test_resubscribe_replaces_topics() {
    let (registry, _counters) = counting_registry(Duration::from_secs(3));
    let dispatcher = Dispatcher::new(Arc::new(registry));
    let (client, mut rx) = dispatcher.connect().await;

    dispatcher
        .subscribe(client, &["metrics", "logs"])
        .await
        .unwrap();
    dispatcher.collect().await;
    dispatcher.dispatch_tick().await;
    assert_eq!(topics_of(&drain(&mut rx)), vec![Topic::Metrics, Topic::Logs]);

    dispatcher.subscribe(client, &["logs"]).await.unwrap();
    dispatcher.dispatch_tick().await;

    assert_eq!(topics_of(&drain(&mut rx)), vec![Topic::Logs]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_keeps_serving_last_value() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let mut registry = CollectorRegistry::new();
    registry.register(
        Topic::Metrics,
        move || {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Ok(Some(json!({ "cpu": 12.5 })))
                } else {
                    Err(anyhow::anyhow!("sampling failed"))
                }
            }
        },
        Duration::from_secs(1),
    );
    let dispatcher = Dispatcher::new(Arc::new(registry));
    let (client, mut rx) = dispatcher.connect().await;
    dispatcher.subscribe(client, &["metrics"]).await.unwrap();

    for _ in 0..3 {
        dispatcher.collect().await;
        dispatcher.dispatch_tick().await;
        advance(Duration::from_secs(1)).await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m.data == json!({ "cpu": 12.5 })));
}

#[tokio::test(start_paused = true)]
async fn test_gone_client_does_not_block_others() {
    let (registry, _counters) = counting_registry(Duration::from_secs(3));
    let dispatcher = Dispatcher::new(Arc::new(registry));
    let (gone, gone_rx) = dispatcher.connect().await;
    let (alive, mut alive_rx) = dispatcher.connect().await;
    dispatcher.subscribe(gone, &["logs"]).await.unwrap();
    dispatcher.subscribe(alive, &["logs"]).await.unwrap();
    dispatcher.collect().await;

    drop(gone_rx);
    dispatcher.dispatch_tick().await;

    assert_eq!(topics_of(&drain(&mut alive_rx)), vec![Topic::Logs]);
    assert_eq!(dispatcher.client_count().await, 1);
    assert_eq!(dispatcher.subscribed_topics(gone).await, None);
    assert_eq!(dispatcher.active_topics().await, HashSet::from([Topic::Logs]));
}

#[tokio::test(start_paused = true)]
async fn test_loops_only_poll_subscribed_topics() {
    let (registry, counters) = counting_registry(Duration::from_secs(3));
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));
    let (client, mut rx) = dispatcher.connect().await;
    dispatcher.subscribe(client, &["logs"]).await.unwrap();

    let handle = TelemetryHandle::spawn(
        dispatcher.clone(),
        Duration::from_secs(1),
        Duration::from_millis(500),
    );
    tokio::time::sleep(Duration::from_millis(9500)).await;
    handle.shutdown().await;

    let logs = calls_for(&counters, Topic::Logs);
    assert!((3..=4).contains(&logs), "expected 3-4 polls, got {logs}");
    assert_eq!(calls_for(&counters, Topic::Metrics), 0);
    assert_eq!(calls_for(&counters, Topic::Status), 0);

    // dispatch repeats the cached value between polls
    let messages = drain(&mut rx);
    assert!(messages.len() > logs);
    assert!(messages.iter().all(|m| m.topic == Topic::Logs));
}
