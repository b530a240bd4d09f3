use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use table_hub::gateway::events::ViewerIdentity;
use table_hub::query::{HttpStateQuery, Personalizer, QueryError, StateQuery, View};

fn hole_cards(owner: Option<&str>, address: &str, hand: [&str; 2]) -> Value {
    if owner == Some(address) {
        json!(hand)
    } else {
        json!(["X", "X"])
    }
}

fn stored_game(owner: Option<&str>) -> Value {
    json!({
        "id": "g1",
        "players": [
            {"address": "b52alice", "holeCards": hole_cards(owner, "b52alice", ["AS", "KD"])},
            {"address": "b52bob", "holeCards": hole_cards(owner, "b52bob", ["7C", "7H"])},
        ],
    })
}

async fn game(Path(game_id): Path<String>) -> Result<Json<Value>, StatusCode> {
    if game_id != "g1" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({ "game": stored_game(None).to_string() })))
}

async fn game_state(
    Path(game_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if game_id != "g1" {
        return Err(StatusCode::NOT_FOUND);
    }
    let address = params.get("player_address").cloned().unwrap_or_default();
    let signed = params.get("signature").map(String::as_str) == Some("0xbob")
        && params.get("timestamp").map(String::as_str) == Some("1700000000");
    if address != "b52bob" || !signed {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(json!({ "gameState": stored_game(Some(&address)).to_string() })))
}

/// Stand-in for the ledger's REST query gateway.
async fn start_query_service() -> SocketAddr {
    let app = Router::new()
        .route("/pokerchain/poker/v1/game/{game_id}", get(game))
        .route("/pokerchain/poker/v1/game_state/{game_id}", get(game_state));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn viewer(signature: &str) -> ViewerIdentity {
    ViewerIdentity {
        player_address: "b52bob".to_string(),
        timestamp: 1_700_000_000,
        signature: signature.to_string(),
    }
}

#[tokio::test]
async fn public_fetch_decodes_embedded_game() {
    let addr = start_query_service().await;
    let query = HttpStateQuery::new(&format!("http://{addr}"));
    let state = query.fetch_public("g1").await.unwrap();
    assert_eq!(state["id"], "g1");
    assert_eq!(state["players"][1]["holeCards"], json!(["X", "X"]));
}

#[tokio::test]
async fn authenticated_fetch_sends_credential() {
    let addr = start_query_service().await;
    let query = HttpStateQuery::new(&format!("http://{addr}/"));
    let state = query.fetch_authenticated("g1", &viewer("0xbob")).await.unwrap();
    assert_eq!(state["players"][1]["holeCards"], json!(["7C", "7H"]));
    assert_eq!(state["players"][0]["holeCards"], json!(["X", "X"]));
}

#[tokio::test]
async fn status_codes_map_to_errors() {
    let addr = start_query_service().await;
    let query = HttpStateQuery::new(&format!("http://{addr}"));

    let err = query.fetch_authenticated("g1", &viewer("0xeve")).await.unwrap_err();
    assert!(matches!(err, QueryError::Unauthenticated), "{err:?}");

    let err = query.fetch_public("g404").await.unwrap_err();
    assert!(matches!(err, QueryError::NotFound(ref id) if id == "g404"), "{err:?}");
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let query = HttpStateQuery::new("http://127.0.0.1:1");
    let err = query.fetch_public("g1").await.unwrap_err();
    assert!(matches!(err, QueryError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn personalizer_falls_back_when_service_rejects_signature() {
    let addr = start_query_service().await;
    let query: Arc<dyn StateQuery> = Arc::new(HttpStateQuery::new(&format!("http://{addr}")));
    let personalizer = Personalizer::new(query, Duration::from_secs(2));

    let good = personalizer.snapshot("g1", Some(&viewer("0xbob"))).await.unwrap();
    assert_eq!(
        good.view,
        View::Personalized {
            player_address: "b52bob".into()
        }
    );
    assert_eq!(good.data["gameState"]["players"][1]["holeCards"][0], "7C");

    let forged = personalizer.snapshot("g1", Some(&viewer("0xeve"))).await.unwrap();
    assert_eq!(forged.view, View::Public);
    assert_eq!(forged.data["players"][1]["holeCards"][0], "X");

    assert!(personalizer.snapshot("g404", None).await.is_err());
}
