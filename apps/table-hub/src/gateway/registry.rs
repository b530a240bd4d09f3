//! Subscription index owned by the hub actor.
//!
//! Two views of the same relation are kept: game → connections (for fan-out)
//! and connection → games (for cleanup on disconnect). Every mutation goes
//! through a method here so the two never disagree.

use std::collections::{HashMap, HashSet};

use super::events::{GameId, ViewerIdentity};
use super::session::{ConnectionHandle, ConnectionId};

/// A live connection as seen by the hub.
#[derive(Debug)]
pub struct ConnectionEntry {
    pub handle: ConnectionHandle,
    /// Identity captured from the most recent subscribe that carried one.
    pub viewer: Option<ViewerIdentity>,
    /// Inverse index: games this connection is subscribed to.
    pub games: HashSet<GameId>,
}

#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    games: HashMap<GameId, HashSet<ConnectionId>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection with no subscriptions. Returns `false` if the id is
    /// already registered.
    pub fn insert_connection(&mut self, handle: ConnectionHandle) -> bool {
        if self.connections.contains_key(&handle.id) {
            return false;
        }
        let id = handle.id.clone();
        self.connections.insert(
            id,
            ConnectionEntry {
                handle,
                viewer: None,
                games: HashSet::new(),
            },
        );
        true
    }

    /// Remove a connection and every subscription it holds. Empty game
    /// entries are dropped. The returned entry owns the outbound sender;
    /// dropping it closes the queue.
    pub fn remove_connection(&mut self, id: &ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.connections.remove(id)?;
        for game_id in &entry.games {
            self.detach(game_id, id);
        }
        Some(entry)
    }

    /// Pair a connection with a game. Returns `None` for an unknown
    /// connection, otherwise whether the pairing is new.
    pub fn subscribe(&mut self, id: &ConnectionId, game_id: &str) -> Option<bool> {
        let entry = self.connections.get_mut(id)?;
        let added = entry.games.insert(game_id.to_string());
        self.games
            .entry(game_id.to_string())
            .or_default()
            .insert(id.clone());
        Some(added)
    }

    /// Remove one pairing. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: &ConnectionId, game_id: &str) -> bool {
        let removed = self
            .connections
            .get_mut(id)
            .is_some_and(|entry| entry.games.remove(game_id));
        if removed {
            self.detach(game_id, id);
        }
        removed
    }

    fn detach(&mut self, game_id: &str, id: &ConnectionId) {
        if let Some(subscribers) = self.games.get_mut(game_id) {
            subscribers.remove(id);
            if subscribers.is_empty() {
                self.games.remove(game_id);
            }
        }
    }

    pub fn set_viewer(&mut self, id: &ConnectionId, viewer: ViewerIdentity) {
        if let Some(entry) = self.connections.get_mut(id) {
            entry.viewer = Some(viewer);
        }
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(id)
    }

    pub fn is_subscribed(&self, id: &ConnectionId, game_id: &str) -> bool {
        self.connections
            .get(id)
            .is_some_and(|entry| entry.games.contains(game_id))
    }

    /// Connections currently subscribed to `game_id`.
    pub fn subscribers<'a>(&'a self, game_id: &str) -> impl Iterator<Item = &'a ConnectionId> + 'a {
        self.games.get(game_id).into_iter().flatten()
    }

    pub fn subscriber_count(&self, game_id: &str) -> usize {
        self.games.get(game_id).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    /// Panics if the forward and inverse views disagree.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (game_id, subscribers) in &self.games {
            assert!(!subscribers.is_empty(), "empty entry left for {game_id}");
            for id in subscribers {
                let entry = self.connections.get(id).expect("subscriber is registered");
                assert!(entry.games.contains(game_id), "{id} missing {game_id} in inverse index");
            }
        }
        for (id, entry) in &self.connections {
            for game_id in &entry.games {
                assert!(
                    self.games.get(game_id).is_some_and(|s| s.contains(id)),
                    "{id} missing from forward index for {game_id}"
                );
            }
        }
    }
}
