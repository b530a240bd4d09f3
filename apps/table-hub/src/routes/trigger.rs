use axum::extract::{Query, State};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::events::EventKind;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/trigger", get(trigger).post(trigger))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TriggerParams {
    /// Game whose subscribers should be refreshed.
    pub game_id: Option<String>,
    /// Snapshot-bearing event kind: `state`, `confirmed`, or a ledger event
    /// such as `action_performed`.
    pub event: Option<String>,
}

/// Manually broadcast a fresh snapshot of a game, as if the ledger had
/// emitted `event` for it.
#[utoipa::path(
    get,
    path = "/trigger",
    tag = "Admin",
    params(TriggerParams),
    responses(
        (status = 200, description = "Broadcast queued", body = String, content_type = "text/plain"),
        (status = 400, description = "Missing or unknown parameter", body = ApiErrorBody),
        (status = 503, description = "Hub has stopped", body = ApiErrorBody),
    ),
)]
pub async fn trigger(
    State(state): State<AppState>,
    Query(params): Query<TriggerParams>,
) -> Result<String, ApiError> {
    let (Some(game_id), Some(event)) = (
        params.game_id.filter(|s| !s.is_empty()),
        params.event.filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Missing game_id or event parameter"));
    };

    let kind = EventKind::parse(&event)
        .filter(|kind| kind.carries_snapshot())
        .ok_or_else(|| ApiError::bad_request(format!("Unsupported event: {event}")))?;

    state.hub.broadcast(game_id.clone(), kind)?;
    tracing::info!(game_id = %game_id, event = %kind, "manual broadcast triggered");
    Ok(format!("Triggered {event} event for game {game_id}"))
}
