#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use table_hub::config::Config;
use table_hub::gateway::events::ViewerIdentity;
use table_hub::gateway::Hub;
use table_hub::query::{MemoryStateQuery, Personalizer};
use table_hub::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const BOB: &str = "b52bob";
pub const BOB_SIGNATURE: &str = "0xb0b5160";

/// Config with short timeouts suitable for tests.
pub fn test_config() -> Config {
    Config {
        port: 0,
        tendermint_ws_url: "ws://127.0.0.1:1/websocket".to_string(),
        state_query_url: "http://127.0.0.1:1".to_string(),
        query_timeout: Duration::from_secs(2),
        upstream_retry: Duration::from_millis(100),
        keepalive_interval: Duration::from_secs(30),
        read_timeout: Duration::from_secs(30),
        write_timeout: Duration::from_secs(5),
        outbound_capacity: 64,
    }
}

/// A two-seat table `g1`: alice in seat 1, bob in seat 2. Bob holds a valid
/// credential.
pub fn sample_table() -> Arc<MemoryStateQuery> {
    let query = Arc::new(MemoryStateQuery::new());
    query.put_game(
        "g1",
        json!({
            "id": "g1",
            "players": [
                {"address": "b52alice", "seat": 1, "holeCards": ["AS", "KD"]},
                {"address": BOB, "seat": 2, "holeCards": ["7C", "7H"]},
            ],
            "deck": "2C3C4C5C",
        }),
    );
    query.accept_signature(BOB, BOB_SIGNATURE);
    query
}

pub fn bob() -> ViewerIdentity {
    ViewerIdentity {
        player_address: BOB.to_string(),
        timestamp: 1_700_000_000,
        signature: BOB_SIGNATURE.to_string(),
    }
}

/// Spawn a hub over `query` and wrap it in application state.
pub fn test_state(config: Config, query: Arc<MemoryStateQuery>) -> AppState {
    let personalizer = Personalizer::new(query, config.query_timeout);
    let (hub, _task) = Hub::spawn(personalizer);
    AppState {
        hub,
        config: Arc::new(config),
    }
}

pub fn test_app(query: Arc<MemoryStateQuery>) -> (Router, AppState) {
    let state = test_state(test_config(), query);
    let app = table_hub::routes::router().with_state(state.clone());
    (app, state)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background.
pub async fn start_ws_server(config: Config, query: Arc<MemoryStateQuery>) -> (SocketAddr, AppState) {
    let state = test_state(config, query);
    let app = table_hub::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

pub async fn connect(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Next JSON envelope, skipping control frames.
pub async fn next_envelope(ws: &mut WsClient) -> Value {
    time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str::<Value>(text.as_str()).expect("envelope is json")
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for envelope")
}

/// Assert that no text frame arrives within `window`.
pub async fn assert_silent(ws: &mut WsClient, window: Duration) {
    let res = time::timeout(window, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                other => return other,
            }
        }
    })
    .await;
    assert!(res.is_err(), "unexpected frame: {res:?}");
}

/// Poll the hub until `check` accepts its stats.
pub async fn wait_for_stats(
    state: &AppState,
    check: impl Fn(table_hub::gateway::hub::HubStats) -> bool,
) {
    for _ in 0..50 {
        if check(state.hub.stats().await.expect("hub running")) {
            return;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    panic!("hub never reached the expected state");
}
