use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{QueryError, StateQuery};
use crate::gateway::events::{GameId, ViewerIdentity};

/// Placeholder the state-query service substitutes for a hidden card.
pub const REDACTED_CARD: &str = "X";

// ---------------------------------------------------------------------------
// In-memory implementation (test double)
// ---------------------------------------------------------------------------

/// Holds unredacted game states and applies the same redaction policy as the
/// ledger's query service: a player's `holeCards` are visible only to that
/// player and the `deck` is never visible.
#[derive(Default)]
pub struct MemoryStateQuery {
    games: Mutex<HashMap<GameId, Value>>,
    /// address → signature accepted for it
    credentials: Mutex<HashMap<String, String>>,
    delay: Mutex<Option<Duration>>,
    public_fetches: AtomicUsize,
    authenticated_fetches: AtomicUsize,
}

impl MemoryStateQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_game(&self, game_id: &str, state: Value) {
        self.games.lock().insert(game_id.to_string(), state);
    }

    /// Accept `signature` as proof of ownership of `address`.
    pub fn accept_signature(&self, address: &str, signature: &str) {
        self.credentials
            .lock()
            .insert(address.to_string(), signature.to_string());
    }

    /// Make every fetch wait before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn public_fetches(&self) -> usize {
        self.public_fetches.load(Ordering::SeqCst)
    }

    pub fn authenticated_fetches(&self) -> usize {
        self.authenticated_fetches.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn redacted(&self, game_id: &str, owner: Option<&str>) -> Result<Value, QueryError> {
        let mut state = self
            .games
            .lock()
            .get(game_id)
            .cloned()
            .ok_or_else(|| QueryError::NotFound(game_id.to_string()))?;
        redact(&mut state, owner);
        Ok(state)
    }
}

fn redact(state: &mut Value, owner: Option<&str>) {
    if let Some(players) = state.get_mut("players").and_then(Value::as_array_mut) {
        for player in players {
            let is_owner = owner.is_some()
                && player.get("address").and_then(Value::as_str) == owner;
            if is_owner {
                continue;
            }
            if let Some(cards) = player.get_mut("holeCards").and_then(Value::as_array_mut) {
                for card in cards {
                    *card = Value::from(REDACTED_CARD);
                }
            }
        }
    }
    if let Some(deck) = state.get_mut("deck") {
        *deck = Value::from(REDACTED_CARD);
    }
}

#[async_trait]
impl StateQuery for MemoryStateQuery {
    async fn fetch_public(&self, game_id: &str) -> Result<Value, QueryError> {
        self.public_fetches.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        self.redacted(game_id, None)
    }

    async fn fetch_authenticated(
        &self,
        game_id: &str,
        viewer: &ViewerIdentity,
    ) -> Result<Value, QueryError> {
        self.authenticated_fetches.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let accepted = self
            .credentials
            .lock()
            .get(&viewer.player_address)
            .is_some_and(|sig| *sig == viewer.signature);
        if !accepted {
            return Err(QueryError::Unauthenticated);
        }
        self.redacted(game_id, Some(&viewer.player_address))
    }
}
