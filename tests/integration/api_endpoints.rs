//! Control and telemetry endpoints over real sockets

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use compose_monitor::{
    Topic,
    actions::{ActionEntry, ActionError, ActionName, ActionRunner},
    api::HealthResponse,
    collector::CollectorRegistry,
    dispatcher::Dispatcher,
};
use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::helpers::*;

fn empty_dispatcher() -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(Arc::new(CollectorRegistry::new())))
}

/// `start` refuses running services; the executor counts its invocations
fn start_runner(calls: Arc<AtomicUsize>) -> ActionRunner {
    let mut runner = ActionRunner::new();
    runner.register(
        ActionName::Start,
        ActionEntry::new(move |_service: String| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<(), anyhow::Error>(()) }
        })
        .with_validator(|service: String| async move {
            match service.as_str() {
                "web" => Err(ActionError::ServiceRunning),
                "worker" => Ok(()),
                _ => Err(ActionError::UnknownService),
            }
        }),
    );
    runner
}

#[tokio::test]
async fn test_failed_precondition_never_executes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let addr = spawn_agent(start_runner(calls.clone()), empty_dispatcher()).await;

    let (status, body) = post_action(addr, json!({ "service": "web", "action": "start" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "service already running" }));

    let (status, body) = post_action(addr, json!({ "service": "db", "action": "start" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "service not found" }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_accepted_action_runs_in_background() {
    let calls = Arc::new(AtomicUsize::new(0));
    let addr = spawn_agent(start_runner(calls.clone()), empty_dispatcher()).await;

    let (status, body) =
        post_action(addr, json!({ "service": "worker", "action": "start" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
    assert!(
        eventually(|| {
            let calls = calls.clone();
            async move { calls.load(Ordering::SeqCst) == 1 }
        })
        .await
    );
}

#[tokio::test]
async fn test_malformed_requests() {
    let addr = spawn_agent(start_runner(Arc::default()), empty_dispatcher()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/action"))
        .header("content-type", "application/json")
        .body("{\"service\":")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>().await.unwrap()["error"].is_string());

    let (status, body) = post_action(addr, json!({ "action": "start" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "you must provide a service and action" }));

    let (status, body) = post_action(addr, json!({ "service": "web", "action": "scale" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "invalid action" }));
}

#[tokio::test]
async fn test_busy_runner_rejects_and_health_reports_it() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let mut runner = ActionRunner::new();
    {
        let started = started.clone();
        let release = release.clone();
        runner.register(
            ActionName::Restart,
            ActionEntry::new(move |_service: String| {
                let started = started.clone();
                let release = release.clone();
                async move {
                    started.notify_one();
                    release.notified().await;
                    Ok::<(), anyhow::Error>(())
                }
            }),
        );
    }
    let addr = spawn_agent(runner, empty_dispatcher()).await;

    let (status, _) = post_action(addr, json!({ "service": "web", "action": "restart" })).await;
    assert_eq!(status, StatusCode::OK);
    started.notified().await;

    let (status, body) = post_action(addr, json!({ "service": "db", "action": "restart" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "action already running" }));

    let health: HealthResponse = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "ok");
    assert!(health.action_running);

    release.notify_one();
    assert!(
        eventually(move || async move {
            let health: HealthResponse = reqwest::get(format!("http://{addr}/health"))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            !health.action_running
        })
        .await
    );
}

#[tokio::test]
async fn test_websocket_subscribe_and_receive() {
    let mut registry = CollectorRegistry::new();
    registry.register(
        Topic::Status,
        || async {
            Ok::<_, anyhow::Error>(Some(json!([{ "Service": "web", "State": "running" }])))
        },
        Duration::from_secs(3),
    );
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));
    let addr = spawn_agent(ActionRunner::new(), dispatcher.clone()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    assert!(
        eventually(|| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.client_count().await == 1 }
        })
        .await
    );

    // unknown topics are ignored entirely
    ws.send(Message::Text(
        json!({ "event": "subscribe", "topics": ["status", "cpu"] }).to_string(),
    ))
    .await
    .unwrap();
    ws.send(Message::Text(
        json!({ "event": "subscribe", "topics": ["status"] }).to_string(),
    ))
    .await
    .unwrap();
    assert!(
        eventually(|| {
            let dispatcher = dispatcher.clone();
            async move { !dispatcher.active_topics().await.is_empty() }
        })
        .await
    );

    dispatcher.collect().await;
    dispatcher.dispatch_tick().await;

    let frame = tokio::time::timeout(Duration::from_secs(1), ws.next())
        .await
        .expect("no frame received")
        .unwrap()
        .unwrap();
    assert!(frame.is_text(), "expected a text frame, got {frame:?}");
    let text = frame.into_text().unwrap();
    assert_eq!(
        serde_json::from_str::<Value>(&text).unwrap(),
        json!({ "event": "status", "data": [{ "Service": "web", "State": "running" }] })
    );

    ws.close(None).await.unwrap();
    assert!(
        eventually(|| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.client_count().await == 0 }
        })
        .await
    );
    assert!(dispatcher.active_topics().await.is_empty());
}

#[tokio::test]
async fn test_websocket_unsubscribe_stops_delivery() {
    let mut registry = CollectorRegistry::new();
    registry.register(
        Topic::Logs,
        || async { Ok::<_, anyhow::Error>(Some(json!("web-1 | ready"))) },
        Duration::from_secs(3),
    );
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));
    let addr = spawn_agent(ActionRunner::new(), dispatcher.clone()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws.send(Message::Text(
        json!({ "event": "subscribe", "topics": ["logs"] }).to_string(),
    ))
    .await
    .unwrap();
    assert!(
        eventually(|| {
            let dispatcher = dispatcher.clone();
            async move { !dispatcher.active_topics().await.is_empty() }
        })
        .await
    );

    ws.send(Message::Text(json!({ "event": "unsubscribe" }).to_string()))
        .await
        .unwrap();
    assert!(
        eventually(|| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.active_topics().await.is_empty() }
        })
        .await
    );

    dispatcher.registry().run_due(None).await;
    assert_eq!(dispatcher.dispatch_tick().await, 0);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), ws.next())
            .await
            .is_err()
    );
    // still connected
    assert_eq!(dispatcher.client_count().await, 1);
}
