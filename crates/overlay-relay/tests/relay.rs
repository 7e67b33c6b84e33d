//! End-to-end relay tests over real WebSocket connections.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use overlay_relay::{RelayConfig, RelayHandle};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn boot() -> RelayHandle {
    let config = RelayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..Default::default()
    };
    overlay_relay::start(config).await.unwrap()
}

async fn connect(handle: &RelayHandle, query: &str) -> WsStream {
    let url = format!("ws://127.0.0.1:{}/mouse{query}", handle.port());
    let (ws, _) = timeout(TIMEOUT, connect_async(&url)).await.unwrap().unwrap();
    ws
}

async fn next_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        match msg {
            Message::Text(text) => return text.to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn consumer_before_producer_sees_false_status() {
    let handle = boot().await;
    let mut consumer = connect(&handle, "").await;
    assert_eq!(next_text(&mut consumer).await, r#"{"type":"status","producerConnected":false}"#);
}

#[tokio::test]
async fn consumer_after_producer_sees_true_status() {
    let handle = boot().await;
    let _producer = connect(&handle, "?source=obs").await;
    let registry = handle.registry().clone();
    wait_until(|| registry.producer_connected()).await;

    let mut consumer = connect(&handle, "").await;
    assert_eq!(next_text(&mut consumer).await, r#"{"type":"status","producerConnected":true}"#);
}

#[tokio::test]
async fn producer_stream_reaches_all_consumers_verbatim() {
    let handle = boot().await;
    let mut consumers = Vec::new();
    for _ in 0..3 {
        let mut ws = connect(&handle, "").await;
        let _status = next_text(&mut ws).await;
        consumers.push(ws);
    }

    let mut producer = connect(&handle, "?source=obs").await;
    let registry = handle.registry().clone();
    wait_until(|| registry.producer_connected()).await;

    let payloads = [
        r#"{"type":"mouse","x":10,"y":20,"buttons":{"left":false,"right":false,"middle":false}}"#,
        r#"{"type":"click","button":"left","pressed":true,"x":10,"y":20}"#,
        r#"{ "type" : "move", "x": 11.5, "y": 21 }"#,
        r#"not even json"#,
    ];
    for payload in payloads {
        producer.send(Message::Text(payload.into())).await.unwrap();
    }

    for consumer in &mut consumers {
        for payload in payloads {
            assert_eq!(next_text(consumer).await, payload);
        }
    }
}

#[tokio::test]
async fn status_is_not_resent_on_producer_churn() {
    let handle = boot().await;
    let registry = handle.registry().clone();

    let mut consumer = connect(&handle, "").await;
    assert_eq!(next_text(&mut consumer).await, r#"{"type":"status","producerConnected":false}"#);

    let mut producer = connect(&handle, "?source=obs").await;
    wait_until(|| registry.producer_connected()).await;
    producer.send(Message::Text("first".into())).await.unwrap();
    assert_eq!(next_text(&mut consumer).await, "first");

    producer.close(None).await.unwrap();
    wait_until(|| !registry.producer_connected()).await;

    let mut producer = connect(&handle, "?source=obs").await;
    wait_until(|| registry.producer_connected()).await;
    producer.send(Message::Text("second".into())).await.unwrap();
    assert_eq!(next_text(&mut consumer).await, "second");
}

#[tokio::test]
async fn second_producer_replaces_first_without_closing_it() {
    let handle = boot().await;
    let registry = handle.registry().clone();

    let mut first = connect(&handle, "?source=obs").await;
    wait_until(|| registry.producer_connected()).await;
    let first_id = registry.current_producer();

    let mut second = connect(&handle, "?source=obs").await;
    wait_until(|| registry.current_producer() != first_id).await;

    let mut consumer = connect(&handle, "").await;
    let _status = next_text(&mut consumer).await;

    // The orphaned producer is still open and usable.
    first.send(Message::Text("from-first".into())).await.unwrap();
    assert_eq!(next_text(&mut consumer).await, "from-first");

    // Its late close must not clear the newer producer's slot.
    first.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(registry.producer_connected());

    second.send(Message::Text("from-second".into())).await.unwrap();
    assert_eq!(next_text(&mut consumer).await, "from-second");
}

#[tokio::test]
async fn dropped_consumer_does_not_affect_others() {
    let handle = boot().await;
    let registry = handle.registry().clone();

    let mut stays = connect(&handle, "").await;
    let _ = next_text(&mut stays).await;
    let mut leaves = connect(&handle, "").await;
    let _ = next_text(&mut leaves).await;
    wait_until(|| registry.consumer_count() == 2).await;

    leaves.close(None).await.unwrap();
    drop(leaves);
    wait_until(|| registry.consumer_count() == 1).await;

    let mut producer = connect(&handle, "?source=obs").await;
    wait_until(|| registry.producer_connected()).await;
    producer.send(Message::Text("still here".into())).await.unwrap();
    assert_eq!(next_text(&mut stays).await, "still here");
}

#[tokio::test]
async fn health_reports_registry_state() {
    let handle = boot().await;
    let registry = handle.registry().clone();
    let _consumer = connect(&handle, "").await;
    let _producer = connect(&handle, "?source=obs").await;
    wait_until(|| registry.producer_connected() && registry.consumer_count() == 1).await;

    let url = format!("http://127.0.0.1:{}/health", handle.port());
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["producerConnected"], true);
    assert_eq!(body["consumers"], 1);
}
