mod common;

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;

use table_hub::gateway::events::{EventKind, LedgerEventKind};

use common::{BOB, BOB_SIGNATURE};

#[tokio::test]
async fn each_viewer_sees_only_their_own_cards() {
    let (addr, state) = common::start_ws_server(common::test_config(), common::sample_table()).await;

    // Anonymous viewer.
    let mut alice = common::connect(addr).await;
    common::send_json(&mut alice, json!({"type": "subscribe", "game_id": "g1"})).await;
    let snap = common::next_envelope(&mut alice).await;
    assert_eq!(snap["event"], "state");
    assert_eq!(snap["game_id"], "g1");
    assert_eq!(snap["data"]["players"][0]["holeCards"], json!(["X", "X"]));
    assert_eq!(snap["data"]["players"][1]["holeCards"], json!(["X", "X"]));
    assert_eq!(snap["data"]["deck"], "X");

    // Bob owns seat 2 and signs his subscription.
    let mut bob = common::connect(addr).await;
    common::send_json(
        &mut bob,
        json!({
            "type": "subscribe",
            "game_id": "g1",
            "player_address": BOB,
            "timestamp": 1_700_000_000,
            "signature": BOB_SIGNATURE,
        }),
    )
    .await;
    let snap = common::next_envelope(&mut bob).await;
    assert_eq!(snap["event"], "state");
    let game = &snap["data"]["gameState"];
    assert_eq!(game["players"][1]["holeCards"], json!(["7C", "7H"]));
    assert_eq!(game["players"][0]["holeCards"], json!(["X", "X"]));

    // A ledger event refreshes both, each with their own view.
    state
        .hub
        .broadcast("g1", EventKind::Ledger(LedgerEventKind::ActionPerformed))
        .unwrap();
    let for_alice = common::next_envelope(&mut alice).await;
    let for_bob = common::next_envelope(&mut bob).await;
    assert_eq!(for_alice["event"], "action_performed");
    assert_eq!(for_alice["data"]["players"][1]["holeCards"][0], "X");
    assert_eq!(for_bob["event"], "action_performed");
    assert_eq!(for_bob["data"]["gameState"]["players"][1]["holeCards"][0], "7C");
    common::assert_silent(&mut alice, Duration::from_millis(150)).await;
    common::assert_silent(&mut bob, Duration::from_millis(150)).await;
}

#[tokio::test]
async fn forged_signature_sees_public_view() {
    let (addr, _state) = common::start_ws_server(common::test_config(), common::sample_table()).await;
    let mut eve = common::connect(addr).await;
    common::send_json(
        &mut eve,
        json!({
            "type": "subscribe",
            "game_id": "g1",
            "player_address": BOB,
            "timestamp": 1_700_000_000,
            "signature": "0xforged",
        }),
    )
    .await;
    let snap = common::next_envelope(&mut eve).await;
    assert_eq!(snap["event"], "state");
    assert!(snap["data"].get("gameState").is_none());
    assert_eq!(snap["data"]["players"][1]["holeCards"], json!(["X", "X"]));
}

#[tokio::test]
async fn action_is_relayed_as_pending_before_confirmation() {
    let (addr, _state) = common::start_ws_server(common::test_config(), common::sample_table()).await;
    let mut alice = common::connect(addr).await;
    let mut watcher = common::connect(addr).await;
    for ws in [&mut alice, &mut watcher] {
        common::send_json(ws, json!({"type": "subscribe", "game_id": "g1"})).await;
        common::next_envelope(ws).await;
    }

    common::send_json(
        &mut alice,
        json!({
            "type": "action",
            "game_id": "g1",
            "player_address": "b52alice",
            "action": "raise",
            "amount": "500",
        }),
    )
    .await;

    let pending = common::next_envelope(&mut watcher).await;
    assert_eq!(pending["event"], "pending");
    assert_eq!(pending["data"]["actor"], "b52alice");
    assert_eq!(pending["data"]["action"], "raise");
    assert_eq!(pending["data"]["amount"], "500");

    assert_eq!(common::next_envelope(&mut alice).await["event"], "pending");
    let ack = common::next_envelope(&mut alice).await;
    assert_eq!(ack["event"], "action_accepted");
    assert_eq!(ack["data"], json!({"action": "raise", "amount": "500", "status": "pending"}));
}

#[tokio::test]
async fn incomplete_action_gets_error_reply() {
    let (addr, _state) = common::start_ws_server(common::test_config(), common::sample_table()).await;
    let mut ws = common::connect(addr).await;
    common::send_json(&mut ws, json!({"type": "action", "game_id": "g1"})).await;
    let err = common::next_envelope(&mut ws).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["game_id"], "g1");
    assert_eq!(err["data"]["message"], "Invalid action message: missing game_id or action");
}

#[tokio::test]
async fn action_without_any_address_is_rejected() {
    let (addr, _state) = common::start_ws_server(common::test_config(), common::sample_table()).await;
    let mut ws = common::connect(addr).await;
    common::send_json(&mut ws, json!({"type": "action", "game_id": "g1", "action": "fold"})).await;
    let err = common::next_envelope(&mut ws).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["message"], "No player address provided");
}

#[tokio::test]
async fn malformed_messages_are_ignored_and_ping_answers_pong() {
    let (addr, _state) = common::start_ws_server(common::test_config(), common::sample_table()).await;
    let mut ws = common::connect(addr).await;

    common::send_json(&mut ws, json!({"type": "shuffle"})).await;
    common::send_json(&mut ws, json!({"type": "subscribe"})).await;
    common::send_json(&mut ws, json!("just a string")).await;
    common::send_json(&mut ws, json!({"type": "ping", "game_id": "g1"})).await;

    let pong = common::next_envelope(&mut ws).await;
    assert_eq!(pong["event"], "pong");
    assert_eq!(pong["game_id"], "g1");
    common::assert_silent(&mut ws, Duration::from_millis(150)).await;
}

#[tokio::test]
async fn unsubscribe_stops_updates() {
    let (addr, state) = common::start_ws_server(common::test_config(), common::sample_table()).await;
    let mut ws = common::connect(addr).await;
    common::send_json(&mut ws, json!({"type": "subscribe", "game_id": "g1"})).await;
    common::next_envelope(&mut ws).await;

    common::send_json(&mut ws, json!({"type": "unsubscribe", "game_id": "g1"})).await;
    common::wait_for_stats(&state, |s| s.active_games == 0).await;

    state.hub.broadcast("g1", EventKind::Confirmed).unwrap();
    common::assert_silent(&mut ws, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn disconnect_removes_all_subscriptions() {
    let (addr, state) = common::start_ws_server(common::test_config(), common::sample_table()).await;
    let mut ws = common::connect(addr).await;
    common::send_json(&mut ws, json!({"type": "subscribe", "game_id": "g1"})).await;
    common::send_json(&mut ws, json!({"type": "subscribe", "game_id": "g2"})).await;
    common::next_envelope(&mut ws).await;
    common::wait_for_stats(&state, |s| s.connections == 1 && s.active_games == 2).await;

    ws.close(None).await.unwrap();
    common::wait_for_stats(&state, |s| s.connections == 0 && s.active_games == 0).await;
}

#[tokio::test]
async fn idle_connection_receives_keepalive_ping() {
    let mut config = common::test_config();
    config.keepalive_interval = Duration::from_millis(100);
    let (addr, _state) = common::start_ws_server(config, common::sample_table()).await;
    let mut ws = common::connect(addr).await;

    let frame = time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("no keep-alive within deadline");
    assert!(matches!(frame, Some(Ok(Message::Ping(_)))), "got {frame:?}");
}

#[tokio::test]
async fn listening_viewer_on_busy_table_stays_connected() {
    let mut config = common::test_config();
    config.keepalive_interval = Duration::from_millis(300);
    config.read_timeout = Duration::from_millis(600);
    let (addr, state) = common::start_ws_server(config, common::sample_table()).await;
    let mut ws = common::connect(addr).await;
    common::send_json(&mut ws, json!({"type": "subscribe", "game_id": "g1"})).await;
    assert_eq!(common::next_envelope(&mut ws).await["event"], "state");

    // The table is busier than the keep-alive interval; the viewer never sends
    // again and only answers pings (the client replies to them while reading).
    let hub = state.hub.clone();
    let traffic = tokio::spawn(async move {
        let mut tick = time::interval(Duration::from_millis(100));
        loop {
            tick.tick().await;
            if hub.broadcast("g1", EventKind::Confirmed).is_err() {
                break;
            }
        }
    });

    let (mut updates, mut pings) = (0, 0);
    let window = time::sleep(Duration::from_millis(1500));
    tokio::pin!(window);
    loop {
        tokio::select! {
            _ = &mut window => break,
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(_))) => updates += 1,
                Some(Ok(Message::Ping(_))) => pings += 1,
                Some(Ok(_)) => {}
                other => panic!("connection ended after {updates} updates, {pings} pings: {other:?}"),
            },
        }
    }
    traffic.abort();

    assert!(updates >= 5, "only {updates} updates");
    assert!(pings >= 2, "only {pings} pings while data was flowing");
    assert_eq!(state.hub.stats().await.unwrap().connections, 1);
}

#[tokio::test]
async fn silent_client_is_dropped_after_read_timeout() {
    let mut config = common::test_config();
    config.read_timeout = Duration::from_millis(200);
    let (addr, state) = common::start_ws_server(config, common::sample_table()).await;
    let mut ws = common::connect(addr).await;
    common::wait_for_stats(&state, |s| s.connections == 1).await;

    let closed = time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server kept a silent connection open");
    common::wait_for_stats(&state, |s| s.connections == 0).await;
}
