//! REST client for the ledger's poker query endpoints.

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::{QueryError, StateQuery};
use crate::gateway::events::ViewerIdentity;

const ROUTE_PREFIX: [&str; 3] = ["pokerchain", "poker", "v1"];

/// `GET /pokerchain/poker/v1/game/{game_id}`. The game is a JSON document
/// embedded as a string.
#[derive(Debug, Deserialize)]
struct GameResponse {
    #[serde(alias = "Game")]
    game: String,
}

/// `GET /pokerchain/poker/v1/game_state/{game_id}?player_address=..&timestamp=..&signature=..`
#[derive(Debug, Deserialize)]
struct GameStateResponse {
    #[serde(alias = "gameState")]
    game_state: String,
}

#[derive(Clone)]
pub struct HttpStateQuery {
    base_url: String,
    http: reqwest::Client,
}

impl HttpStateQuery {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, route: &str, game_id: &str) -> Result<Url, QueryError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| QueryError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| QueryError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(ROUTE_PREFIX)
            .extend([route, game_id]);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        game_id: &str,
    ) -> Result<T, QueryError> {
        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            return resp.json().await.map_err(|e| QueryError::Decode(e.to_string()));
        }
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => QueryError::Unauthenticated,
            StatusCode::NOT_FOUND => QueryError::NotFound(game_id.to_string()),
            other => QueryError::Rejected(other.as_u16()),
        })
    }
}

fn embedded_json(raw: &str) -> Result<Value, QueryError> {
    serde_json::from_str(raw).map_err(|e| QueryError::Decode(e.to_string()))
}

#[async_trait]
impl StateQuery for HttpStateQuery {
    async fn fetch_public(&self, game_id: &str) -> Result<Value, QueryError> {
        let url = self.endpoint("game", game_id)?;
        tracing::debug!(%url, "fetching public game state");
        let body: GameResponse = self.get_json(self.http.get(url), game_id).await?;
        embedded_json(&body.game)
    }

    async fn fetch_authenticated(
        &self,
        game_id: &str,
        viewer: &ViewerIdentity,
    ) -> Result<Value, QueryError> {
        let url = self.endpoint("game_state", game_id)?;
        tracing::debug!(%url, player = %viewer.player_address, "fetching authenticated game state");
        let timestamp = viewer.timestamp.to_string();
        let request = self.http.get(url).query(&[
            ("player_address", viewer.player_address.as_str()),
            ("timestamp", timestamp.as_str()),
            ("signature", viewer.signature.as_str()),
        ]);
        let body: GameStateResponse = self.get_json(request, game_id).await?;
        embedded_json(&body.game_state)
    }
}
