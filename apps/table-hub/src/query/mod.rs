//! Game-state snapshots from the state-query service.
//!
//! Redaction is entirely the service's job: the hub only chooses which of the
//! two fetches to make and never edits a snapshot.

pub mod http;
pub mod memory;
pub mod personalizer;

use async_trait::async_trait;
use serde_json::Value;

use crate::gateway::events::{GameId, ViewerIdentity};

pub use http::HttpStateQuery;
pub use memory::MemoryStateQuery;
pub use personalizer::Personalizer;

/// The state-query collaborator.
///
/// Backed by the ledger's REST gateway in production and an in-memory table
/// in tests.
#[async_trait]
pub trait StateQuery: Send + Sync {
    /// Snapshot with every player's hidden items redacted.
    async fn fetch_public(&self, game_id: &str) -> Result<Value, QueryError>;

    /// Snapshot in which only `viewer`'s own hidden items are revealed. The
    /// service verifies the signature; any failure is reported as an error.
    async fn fetch_authenticated(
        &self,
        game_id: &str,
        viewer: &ViewerIdentity,
    ) -> Result<Value, QueryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("viewer credential rejected")]
    Unauthenticated,
    #[error("game {0} not found")]
    NotFound(GameId),
    #[error("state query rejected the request with status {0}")]
    Rejected(u16),
    #[error("state query transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("undecodable state query response: {0}")]
    Decode(String),
    #[error("state query timed out")]
    Timeout,
    #[error("invalid state query url: {0}")]
    InvalidUrl(String),
}

/// Which redaction policy produced a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Public,
    Personalized { player_address: String },
}

/// A point-in-time game state, already redacted for one viewer.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub view: View,
    pub data: Value,
}
