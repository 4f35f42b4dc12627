//! Integration tests for the gateway HTTP/WebSocket surface.
//!
//! These tests start an actual server on an ephemeral port, log in over
//! HTTP and attach WebSocket clients to verify end-to-end behavior.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use plantpulse_core::{GatewayConfig, TagUpdate};
use plantpulse_server::GatewayServer;
use plantpulse_source::{PollerConfig, SimulatedSource, SourcePoller};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a test server and return its address, the update injection channel
/// and the serve task handle.
async fn start_test_server() -> (
    SocketAddr,
    mpsc::Sender<TagUpdate>,
    tokio::task::JoinHandle<()>,
) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = GatewayServer::from_config(GatewayConfig::default()).unwrap();

    let (update_tx, update_rx) = mpsc::channel(64);
    server.spawn_update_pump(update_rx);

    let handle = tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    (addr, update_tx, handle)
}

/// Log in over HTTP with the given credentials.
async fn login(addr: SocketAddr, username: &str, secret: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/login"))
        .json(&serde_json::json!({ "username": username, "secret": secret }))
        .send()
        .await
        .expect("login request failed")
}

/// Log in with the default credentials and return the token.
async fn login_token(addr: SocketAddr) -> String {
    let response = login(addr, "user", "password123").await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

/// Connect a WebSocket client to the push channel.
async fn connect_stream(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/stream");
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect");
    ws_stream
}

/// Connect, authenticate and consume the snapshot frame.
async fn subscribe(addr: SocketAddr, token: &str) -> WsClient {
    let mut ws = connect_stream(addr).await;
    ws.send(Message::Text(
        serde_json::json!({ "token": token }).to_string(),
    ))
    .await
    .unwrap();

    let snapshot = recv_json(&mut ws).await.expect("no snapshot frame");
    assert!(snapshot["snapshot"].is_array(), "first frame must be a snapshot");
    ws
}

/// Wait for a text frame and parse it as JSON.
async fn recv_json(ws: &mut WsClient) -> Result<serde_json::Value, &'static str> {
    match timeout(Duration::from_secs(5), ws.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => {
            Ok(serde_json::from_str(&text).expect("invalid JSON frame"))
        }
        Ok(Some(Ok(_))) => Err("unexpected message type"),
        Ok(Some(Err(_))) => Err("websocket error"),
        Ok(None) => Err("connection closed"),
        Err(_) => Err("timeout"),
    }
}

/// Inject an update and give the pump a moment to fan it out.
async fn publish(update_tx: &mpsc::Sender<TagUpdate>, tag: &str, value: f64) {
    update_tx.send(TagUpdate::now(tag, value)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_login_success() {
    let (addr, _update_tx, handle) = start_test_server().await;

    let response = login(addr, "user", "password123").await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let token = body["token"].as_str().expect("token missing");
    assert_eq!(token.len(), 32);

    handle.abort();
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let (addr, _update_tx, handle) = start_test_server().await;

    let response = login(addr, "user", "wrong").await;
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_credentials");

    // Unknown user gets the identical rejection
    let response = login(addr, "nobody", "password123").await;
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_credentials");

    handle.abort();
}

#[tokio::test]
async fn test_stream_rejects_invalid_token() {
    let (addr, _update_tx, handle) = start_test_server().await;

    let mut ws = connect_stream(addr).await;
    ws.send(Message::Text(
        serde_json::json!({ "token": "deadbeefdeadbeefdeadbeefdeadbeef" }).to_string(),
    ))
    .await
    .unwrap();

    let frame = recv_json(&mut ws).await.expect("no error frame");
    assert_eq!(frame["error"], "invalid_token");

    // The server closes after the explicit error frame
    match timeout(Duration::from_secs(5), ws.next()).await {
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {}
        other => panic!("expected close, got {other:?}"),
    }

    handle.abort();
}

#[tokio::test]
async fn test_stream_rejects_non_auth_first_frame() {
    let (addr, _update_tx, handle) = start_test_server().await;

    let mut ws = connect_stream(addr).await;
    ws.send(Message::Text("{\"subscribe\": true}".to_string()))
        .await
        .unwrap();

    let frame = recv_json(&mut ws).await.expect("no error frame");
    assert_eq!(frame["error"], "auth_required");

    handle.abort();
}

#[tokio::test]
async fn test_unauthenticated_connection_receives_no_updates() {
    let (addr, update_tx, handle) = start_test_server().await;

    // Connect but never authenticate
    let mut ws = connect_stream(addr).await;
    publish(&update_tx, "KILN_FEED_END_TEMP", 101.2).await;

    match timeout(Duration::from_millis(300), ws.next()).await {
        Err(_) => {} // nothing arrived, as required
        Ok(frame) => panic!("unauthenticated connection received {frame:?}"),
    }

    handle.abort();
}

#[tokio::test]
async fn test_snapshot_contains_last_known_values() {
    let (addr, update_tx, handle) = start_test_server().await;

    // Poll happened before this client existed
    publish(&update_tx, "PREHEATER_EXIT_TEMP", 1450.3).await;

    let token = login_token(addr).await;
    let mut ws = connect_stream(addr).await;
    ws.send(Message::Text(
        serde_json::json!({ "token": token }).to_string(),
    ))
    .await
    .unwrap();

    let frame = recv_json(&mut ws).await.expect("no snapshot");
    let snapshot = frame["snapshot"].as_array().expect("not a snapshot frame");

    // Every registered tag is present, polled or not
    assert_eq!(snapshot.len(), 4);
    let preheater = snapshot
        .iter()
        .find(|e| e["tag"] == "PREHEATER_EXIT_TEMP")
        .unwrap();
    assert_eq!(preheater["value"], 1450.3);
    assert_eq!(preheater["unit"], "°C");
    let kiln = snapshot
        .iter()
        .find(|e| e["tag"] == "KILN_FEED_END_TEMP")
        .unwrap();
    assert!(kiln["value"].is_null(), "never-polled tag must be null");

    handle.abort();
}

#[tokio::test]
async fn test_update_fanout_to_all_sessions() {
    let (addr, update_tx, handle) = start_test_server().await;
    let token = login_token(addr).await;

    let mut first = subscribe(addr, &token).await;
    let mut second = subscribe(addr, &token).await;

    publish(&update_tx, "KILN_FEED_END_TEMP", 101.2).await;

    for ws in [&mut first, &mut second] {
        let frame = recv_json(ws).await.expect("no update frame");
        assert_eq!(frame["tag"], "KILN_FEED_END_TEMP");
        assert_eq!(frame["value"], 101.2);
        assert_eq!(frame["unit"], "°C");
    }

    // A second publish produces exactly the next frame - no duplicates of
    // the first in between
    publish(&update_tx, "COOLER_EXIT_TEMP", 103.4).await;
    for ws in [&mut first, &mut second] {
        let frame = recv_json(ws).await.expect("no update frame");
        assert_eq!(frame["tag"], "COOLER_EXIT_TEMP");
        assert_eq!(frame["value"], 103.4);
    }

    handle.abort();
}

#[tokio::test]
async fn test_disconnected_session_does_not_block_others() {
    let (addr, update_tx, handle) = start_test_server().await;
    let token = login_token(addr).await;

    let first = subscribe(addr, &token).await;
    let mut second = subscribe(addr, &token).await;

    drop(first);
    tokio::time::sleep(Duration::from_millis(100)).await;

    publish(&update_tx, "CLINKER_TONS_PER_HOUR", 201.5).await;

    let frame = recv_json(&mut second).await.expect("no update frame");
    assert_eq!(frame["tag"], "CLINKER_TONS_PER_HOUR");
    assert_eq!(frame["unit"], "t/h");

    handle.abort();
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let (addr, _update_tx, handle) = start_test_server().await;
    let token = login_token(addr).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/logout"))
        .json(&serde_json::json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let mut ws = connect_stream(addr).await;
    ws.send(Message::Text(
        serde_json::json!({ "token": token }).to_string(),
    ))
    .await
    .unwrap();

    let frame = recv_json(&mut ws).await.expect("no error frame");
    assert_eq!(frame["error"], "invalid_token");

    handle.abort();
}

#[tokio::test]
async fn test_tags_endpoint_lists_registry() {
    let (addr, _update_tx, handle) = start_test_server().await;

    let response = reqwest::get(format!("http://{addr}/tags")).await.unwrap();
    assert_eq!(response.status(), 200);
    let tags: serde_json::Value = response.json().await.unwrap();

    let names: Vec<&str> = tags
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "PREHEATER_EXIT_TEMP",
            "KILN_FEED_END_TEMP",
            "COOLER_EXIT_TEMP",
            "CLINKER_TONS_PER_HOUR",
        ]
    );

    handle.abort();
}

#[tokio::test]
async fn test_simulated_source_end_to_end() {
    // Full pipeline: simulator -> poller -> pump -> hub -> websocket
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = GatewayConfig::default();
    let server = GatewayServer::from_config(config).unwrap();
    let registry = server.registry();

    let (update_tx, update_rx) = mpsc::channel(64);
    server.spawn_update_pump(update_rx);

    let source = SimulatedSource::from_registry(&registry);
    let poller = SourcePoller::new(
        registry,
        source,
        PollerConfig {
            poll_interval: Duration::from_millis(50),
            ..PollerConfig::default()
        },
    );
    let poller_handle = poller.start(update_tx);

    let serve_handle = tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    let token = login_token(addr).await;
    let mut ws = subscribe(addr, &token).await;

    // Values flow continuously and stay inside the configured ranges
    let frame = recv_json(&mut ws).await.expect("no update from poller");
    let tag = frame["tag"].as_str().unwrap();
    let value = frame["value"].as_f64().unwrap();
    match tag {
        "PREHEATER_EXIT_TEMP" => assert!((1440.0..=1465.0).contains(&value)),
        "KILN_FEED_END_TEMP" => assert!((98.0..=103.5).contains(&value)),
        "COOLER_EXIT_TEMP" => assert!((99.0..=105.0).contains(&value)),
        "CLINKER_TONS_PER_HOUR" => assert!((198.0..=203.0).contains(&value)),
        other => panic!("unregistered tag {other} on the wire"),
    }

    poller_handle.stop();
    poller_handle.join().await;
    serve_handle.abort();
}
