//! Wire protocol: client requests, hub envelopes, and event kinds.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Opaque key identifying one game/table.
pub type GameId = String;

/// A serialized envelope ready to be written to a socket. Cloning is cheap, so
/// one encoded snapshot can be queued on many connections.
pub type Frame = Arc<str>;

/// Prefix of the message a viewer signs to prove ownership of an address.
pub const SIGNING_MESSAGE_PREFIX: &str = "pokerchain-query:";

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// Ledger events known to carry a `game_id` attribute.
///
/// This is the only place a new upstream event kind has to be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerEventKind {
    ActionPerformed,
    PlayerJoinedGame,
    GameCreated,
}

impl LedgerEventKind {
    pub const ALL: [LedgerEventKind; 3] = [
        LedgerEventKind::ActionPerformed,
        LedgerEventKind::PlayerJoinedGame,
        LedgerEventKind::GameCreated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ActionPerformed => "action_performed",
            Self::PlayerJoinedGame => "player_joined_game",
            Self::GameCreated => "game_created",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

/// The `event` field of a hub → client envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Snapshot sent in response to a subscribe.
    State,
    /// Optimistic notice that an action is in flight.
    Pending,
    Confirmed,
    /// Acknowledgement to the connection that submitted an action.
    ActionAccepted,
    Error,
    Pong,
    Ledger(LedgerEventKind),
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::ActionAccepted => "action_accepted",
            Self::Error => "error",
            Self::Pong => "pong",
            Self::Ledger(kind) => kind.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "state" => Some(Self::State),
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "action_accepted" => Some(Self::ActionAccepted),
            "error" => Some(Self::Error),
            "pong" => Some(Self::Pong),
            other => LedgerEventKind::parse(other).map(Self::Ledger),
        }
    }

    /// Whether envelopes of this kind carry a freshly fetched game snapshot
    /// (and therefore go through per-viewer personalization).
    pub fn carries_snapshot(self) -> bool {
        match self {
            Self::State | Self::Confirmed | Self::Ledger(_) => true,
            Self::Pending | Self::ActionAccepted | Self::Error | Self::Pong => false,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Hub → client envelope
// ---------------------------------------------------------------------------

/// Every message the hub sends to a client. The payload is already redacted
/// for its recipient before it is placed here.
#[derive(Debug, Clone, Serialize)]
pub struct GameUpdate {
    pub game_id: GameId,
    pub timestamp: DateTime<Utc>,
    pub event: EventKind,
    pub data: Value,
}

impl GameUpdate {
    pub fn new(game_id: impl Into<GameId>, event: EventKind, data: Value) -> Self {
        Self {
            game_id: game_id.into(),
            timestamp: Utc::now(),
            event,
            data,
        }
    }

    pub fn pending(action: &PendingAction) -> Self {
        let data = serde_json::to_value(action).unwrap_or(Value::Null);
        Self::new(action.game_id.clone(), EventKind::Pending, data)
    }

    pub fn action_accepted(action: &PendingAction) -> Self {
        Self::new(
            action.game_id.clone(),
            EventKind::ActionAccepted,
            serde_json::json!({
                "action": action.action,
                "amount": action.amount,
                "status": "pending",
            }),
        )
    }

    pub fn error(game_id: impl Into<GameId>, message: &str) -> Self {
        Self::new(game_id, EventKind::Error, serde_json::json!({ "message": message }))
    }

    pub fn pong(game_id: impl Into<GameId>) -> Self {
        Self::new(game_id, EventKind::Pong, Value::Null)
    }

    /// Encode once for queuing.
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}

/// An action that has been relayed but not yet confirmed by the ledger.
/// Lives only for the duration of one broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAction {
    pub game_id: GameId,
    pub actor: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

// ---------------------------------------------------------------------------
// Viewer identity
// ---------------------------------------------------------------------------

/// Claimed address plus a signature over [`ViewerIdentity::signing_message`].
///
/// The hub never verifies the signature itself; it is forwarded to the
/// state-query service, which decides what the viewer may see.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewerIdentity {
    pub player_address: String,
    pub timestamp: i64,
    pub signature: String,
}

impl ViewerIdentity {
    /// Build an identity from optional wire fields. An empty or missing
    /// address means the viewer is anonymous.
    pub fn from_parts(
        player_address: Option<String>,
        timestamp: Option<i64>,
        signature: Option<String>,
    ) -> Option<Self> {
        let player_address = player_address.filter(|a| !a.is_empty())?;
        Some(Self {
            player_address,
            timestamp: timestamp.unwrap_or_default(),
            signature: signature.unwrap_or_default(),
        })
    }

    /// Whether there is a credential worth presenting to the state-query service.
    pub fn is_complete(&self) -> bool {
        !self.signature.is_empty()
    }

    pub fn signing_message(&self) -> String {
        format!("{SIGNING_MESSAGE_PREFIX}{}", self.timestamp)
    }
}

// ---------------------------------------------------------------------------
// Client → hub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Subscribe,
    Unsubscribe,
    Ping,
    Action,
}

/// Raw client message as it appears on the wire.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub player_address: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "amount_as_string")]
    pub amount: Option<String>,
}

/// Amounts are big integers; clients send them as strings but plain JSON
/// numbers are accepted too.
fn amount_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// An action intent submitted by a client for optimistic relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionIntent {
    pub game_id: GameId,
    pub action: String,
    pub amount: Option<String>,
    /// Address given on the request itself, used only when the connection
    /// has no identity of its own.
    pub claimed_actor: Option<String>,
}

/// A validated client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Subscribe {
        game_id: GameId,
        viewer: Option<ViewerIdentity>,
    },
    Unsubscribe {
        game_id: GameId,
    },
    Ping {
        game_id: GameId,
    },
    Action(ActionIntent),
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("malformed client message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{0:?} request without game_id")]
    MissingGameId(RequestKind),
    #[error("Invalid action message: missing game_id or action")]
    IncompleteAction { game_id: GameId },
}

impl RequestError {
    /// Envelope owed to the sender, if this failure is reported back at all.
    /// Only incomplete actions are; everything else is dropped silently.
    pub fn reply(&self) -> Option<GameUpdate> {
        match self {
            Self::IncompleteAction { game_id } => Some(GameUpdate::error(game_id.clone(), &self.to_string())),
            Self::Malformed(_) | Self::MissingGameId(_) => None,
        }
    }
}

impl ClientRequest {
    pub fn decode(text: &str) -> Result<Self, RequestError> {
        let msg: ClientMessage = serde_json::from_str(text)?;
        Self::try_from(msg)
    }
}

impl TryFrom<ClientMessage> for ClientRequest {
    type Error = RequestError;

    fn try_from(msg: ClientMessage) -> Result<Self, Self::Error> {
        match msg.kind {
            RequestKind::Subscribe => {
                if msg.game_id.is_empty() {
                    return Err(RequestError::MissingGameId(msg.kind));
                }
                Ok(Self::Subscribe {
                    viewer: ViewerIdentity::from_parts(
                        msg.player_address,
                        msg.timestamp,
                        msg.signature,
                    ),
                    game_id: msg.game_id,
                })
            }
            RequestKind::Unsubscribe => {
                if msg.game_id.is_empty() {
                    return Err(RequestError::MissingGameId(msg.kind));
                }
                Ok(Self::Unsubscribe { game_id: msg.game_id })
            }
            RequestKind::Ping => Ok(Self::Ping { game_id: msg.game_id }),
            RequestKind::Action => {
                let action = msg.action.filter(|a| !a.is_empty());
                match action {
                    Some(action) if !msg.game_id.is_empty() => Ok(Self::Action(ActionIntent {
                        game_id: msg.game_id,
                        action,
                        amount: msg.amount,
                        claimed_actor: msg.player_address.filter(|a| !a.is_empty()),
                    })),
                    _ => Err(RequestError::IncompleteAction { game_id: msg.game_id }),
                }
            }
        }
    }
}
