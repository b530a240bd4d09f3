//! Personalized fan-out of game snapshots.
//!
//! Subscribers are grouped by the credential they present so that every
//! anonymous (or unsigned) viewer shares one public fetch and each distinct
//! identity costs one authenticated fetch. Fetches run off the hub task; the
//! result comes back to the hub as a [`Delivery`] so the hub stays the only
//! writer to connection queues.

use std::collections::HashMap;

use table_common::id::{prefix, prefixed_ulid};
use tokio::sync::mpsc;

use super::events::{EventKind, GameId, GameUpdate, ViewerIdentity};
use super::hub::{BroadcastRequest, Delivery};
use super::registry::SubscriptionIndex;
use super::session::ConnectionId;
use crate::query::Personalizer;

/// Subscribers that receive the same snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerGroup {
    /// `None` for the shared public view.
    pub viewer: Option<ViewerIdentity>,
    pub members: Vec<ConnectionId>,
}

/// Partition the subscribers of `game_id` by effective credential.
pub fn group_subscribers(index: &SubscriptionIndex, game_id: &str) -> Vec<ViewerGroup> {
    let mut groups: HashMap<Option<ViewerIdentity>, Vec<ConnectionId>> = HashMap::new();
    for id in index.subscribers(game_id) {
        let viewer = index
            .get(id)
            .and_then(|entry| entry.viewer.clone())
            .filter(ViewerIdentity::is_complete);
        groups.entry(viewer).or_default().push(id.clone());
    }
    groups
        .into_iter()
        .map(|(viewer, members)| ViewerGroup { viewer, members })
        .collect()
}

/// Start one fetch per group. Returns the correlation id used in logs.
pub fn spawn_fetches(
    personalizer: &Personalizer,
    loopback: &mpsc::UnboundedSender<BroadcastRequest>,
    game_id: &str,
    event: EventKind,
    groups: Vec<ViewerGroup>,
) -> String {
    let broadcast_id = prefixed_ulid(prefix::BROADCAST);
    for group in groups {
        spawn_fetch(
            personalizer.clone(),
            loopback.clone(),
            broadcast_id.clone(),
            game_id.to_string(),
            event,
            group,
        );
    }
    broadcast_id
}

fn spawn_fetch(
    personalizer: Personalizer,
    loopback: mpsc::UnboundedSender<BroadcastRequest>,
    broadcast_id: String,
    game_id: GameId,
    event: EventKind,
    group: ViewerGroup,
) {
    tokio::spawn(async move {
        let snapshot = match personalizer.snapshot(&game_id, group.viewer.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    broadcast_id = %broadcast_id,
                    game_id = %game_id,
                    %event,
                    recipients = group.members.len(),
                    error = %e,
                    "snapshot fetch failed, skipping delivery"
                );
                return;
            }
        };
        tracing::debug!(
            broadcast_id = %broadcast_id,
            game_id = %game_id,
            %event,
            view = ?snapshot.view,
            recipients = group.members.len(),
            "snapshot ready"
        );
        let delivery = Delivery {
            update: GameUpdate::new(game_id.clone(), event, snapshot.data),
            game_id,
            targets: group.members,
        };
        // The hub is gone if this fails; nothing left to deliver to.
        let _ = loopback.send(BroadcastRequest::Deliver(delivery));
    });
}
