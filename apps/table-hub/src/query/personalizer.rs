use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::{QueryError, Snapshot, StateQuery, View};
use crate::gateway::events::ViewerIdentity;

/// Derives the snapshot one viewer is allowed to see.
///
/// An authenticated fetch is attempted only when the viewer carries a
/// complete credential. Any failure there silently downgrades to the public
/// fetch; only a failure of the public fetch is reported to the caller.
#[derive(Clone)]
pub struct Personalizer {
    query: Arc<dyn StateQuery>,
    timeout: Duration,
}

impl Personalizer {
    pub fn new(query: Arc<dyn StateQuery>, timeout: Duration) -> Self {
        Self { query, timeout }
    }

    pub async fn snapshot(
        &self,
        game_id: &str,
        viewer: Option<&ViewerIdentity>,
    ) -> Result<Snapshot, QueryError> {
        if let Some(viewer) = viewer.filter(|v| v.is_complete()) {
            match self
                .bounded(self.query.fetch_authenticated(game_id, viewer))
                .await
            {
                Ok(state) => {
                    return Ok(Snapshot {
                        view: View::Personalized {
                            player_address: viewer.player_address.clone(),
                        },
                        data: json!({ "gameState": state }),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        game_id,
                        player = %viewer.player_address,
                        error = %e,
                        "authenticated fetch failed, falling back to public view"
                    );
                }
            }
        }

        let data = self.bounded(self.query.fetch_public(game_id)).await?;
        Ok(Snapshot {
            view: View::Public,
            data,
        })
    }

    async fn bounded(
        &self,
        fetch: impl Future<Output = Result<Value, QueryError>>,
    ) -> Result<Value, QueryError> {
        tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| QueryError::Timeout)?
    }
}
