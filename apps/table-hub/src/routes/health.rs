use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// Open client connections.
    pub clients: usize,
    /// Games with at least one subscriber.
    pub active_games: usize,
    pub state_query_url: String,
    pub tendermint_ws: String,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Hub is running", body = HealthResponse),
        (status = 503, description = "Hub has stopped", body = ApiErrorBody),
    ),
)]
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let stats = state.hub.stats().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        clients: stats.connections,
        active_games: stats.active_games,
        state_query_url: state.config.state_query_url.clone(),
        tendermint_ws: state.config.tendermint_ws_url.clone(),
    }))
}
