//! Optimistic action relay.
//!
//! An action intent is echoed to every subscriber of its game as a `pending`
//! envelope before the ledger has seen it. Nothing here validates the action;
//! game rules are enforced by the ledger, whose confirmation arrives later as
//! an ordinary ledger-sourced broadcast.

use super::events::{ActionIntent, GameUpdate, PendingAction, ViewerIdentity};

/// Message returned to the sender when no actor can be attributed.
pub const NO_ACTOR: &str = "No player address provided";

/// Verbs clients are expected to send. Anything else is still relayed.
const KNOWN_ACTIONS: [&str; 10] = [
    "fold", "check", "call", "bet", "raise", "all_in", "join", "leave", "sit_in", "sit_out",
];

/// Envelopes produced by relaying one action.
#[derive(Debug)]
pub enum RelayOutcome {
    /// Broadcast `pending` to all subscribers, then `ack` to the sender.
    Accepted { pending: GameUpdate, ack: GameUpdate },
    /// Send `error` to the sender only.
    Rejected { error: GameUpdate },
}

/// Attribute `intent` to an actor and build the envelopes to send.
///
/// The connection's own identity wins over an address claimed on the request.
pub fn relay(viewer: Option<&ViewerIdentity>, intent: ActionIntent) -> RelayOutcome {
    let actor = viewer
        .map(|v| v.player_address.clone())
        .or(intent.claimed_actor);
    let Some(actor) = actor else {
        tracing::debug!(game_id = %intent.game_id, action = %intent.action, "action without actor");
        return RelayOutcome::Rejected {
            error: GameUpdate::error(intent.game_id, NO_ACTOR),
        };
    };

    if !KNOWN_ACTIONS.contains(&intent.action.as_str()) {
        tracing::debug!(game_id = %intent.game_id, action = %intent.action, "relaying unrecognised action verb");
    }

    let pending = PendingAction {
        game_id: intent.game_id,
        actor,
        action: intent.action,
        amount: intent.amount,
    };
    RelayOutcome::Accepted {
        pending: GameUpdate::pending(&pending),
        ack: GameUpdate::action_accepted(&pending),
    }
}
