//! Ledger JSON-RPC event records.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::gateway::events::{GameId, LedgerEventKind};

/// Event-stream query selecting transactions that emitted `kind` with a
/// `game_id` attribute.
pub fn subscription_query(kind: LedgerEventKind) -> String {
    format!("tm.event='Tx' AND {} EXISTS", game_id_key(kind))
}

/// JSON-RPC `subscribe` call for one event kind.
pub fn subscribe_request(kind: LedgerEventKind, id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "subscribe",
        "params": { "query": subscription_query(kind) },
    })
}

fn game_id_key(kind: LedgerEventKind) -> String {
    format!("{}.game_id", kind.as_str())
}

#[derive(Debug, Deserialize)]
struct RpcRecord {
    #[serde(default)]
    result: Option<RpcResult>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Default, Deserialize)]
struct RpcResult {
    #[serde(default)]
    query: String,
    #[serde(default)]
    events: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// One game that must be refreshed because of a ledger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRefresh {
    pub game_id: GameId,
    pub kind: LedgerEventKind,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LedgerRecord {
    /// Subscription acknowledgement; carries no event.
    Ack,
    /// JSON-RPC error reported by the event stream.
    Error(String),
    /// Games touched by a committed transaction, deduplicated per kind.
    Refresh(Vec<GameRefresh>),
}

/// Interpret one text frame from the ledger event stream.
pub fn parse_record(text: &str) -> Result<LedgerRecord, serde_json::Error> {
    let record: RpcRecord = serde_json::from_str(text)?;
    if let Some(err) = record.error {
        let detail = match err.data {
            Some(Value::String(data)) if !data.is_empty() => format!("{}: {data}", err.message),
            _ => err.message,
        };
        return Ok(LedgerRecord::Error(detail));
    }

    let result = record.result.unwrap_or_default();
    if result.query.is_empty() {
        return Ok(LedgerRecord::Ack);
    }

    // The same transaction is delivered once per matching subscription;
    // only the kinds named by this record's own query are taken from it.
    let named: Vec<LedgerEventKind> = LedgerEventKind::ALL
        .into_iter()
        .filter(|kind| result.query.contains(&game_id_key(*kind)))
        .collect();
    let kinds = if named.is_empty() {
        LedgerEventKind::ALL.to_vec()
    } else {
        named
    };

    let mut refreshes: Vec<GameRefresh> = Vec::new();
    for kind in kinds {
        let Some(game_ids) = result.events.get(&game_id_key(kind)) else {
            continue;
        };
        for game_id in game_ids.iter().filter(|id| !id.is_empty()) {
            let refresh = GameRefresh {
                game_id: game_id.clone(),
                kind,
            };
            if !refreshes.contains(&refresh) {
                refreshes.push(refresh);
            }
        }
    }
    Ok(LedgerRecord::Refresh(refreshes))
}
