//! Upstream event bridge.
//!
//! Keeps one WebSocket subscription to the ledger's event stream and turns
//! every game-scoped event into a hub broadcast. Losing the stream is never
//! fatal: the bridge waits a fixed delay and reconnects, forever.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::events::{parse_record, subscribe_request, LedgerRecord};
use crate::gateway::events::{EventKind, LedgerEventKind};
use crate::gateway::hub::HubHandle;

type LedgerStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("failed to send subscription: {0}")]
    Subscribe(#[source] tungstenite::Error),
    #[error("event stream closed by the ledger")]
    Closed,
    #[error("event stream read failed: {0}")]
    Read(#[source] tungstenite::Error),
    #[error("broadcast hub has stopped")]
    HubStopped,
}

enum BridgeState {
    Connecting,
    Streaming(Box<LedgerStream>),
    Backoff(BridgeError),
}

pub struct EventBridge {
    url: String,
    hub: HubHandle,
    retry_delay: Duration,
}

impl EventBridge {
    pub fn new(url: impl Into<String>, hub: HubHandle, retry_delay: Duration) -> Self {
        Self {
            url: url.into(),
            hub,
            retry_delay,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until the hub stops.
    pub async fn run(self) {
        let mut state = BridgeState::Connecting;
        loop {
            state = match state {
                BridgeState::Connecting => {
                    tracing::info!(url = %self.url, "connecting to ledger event stream");
                    match self.connect().await {
                        Ok(ws) => {
                            tracing::info!(
                                url = %self.url,
                                kinds = LedgerEventKind::ALL.len(),
                                "subscribed to ledger events"
                            );
                            BridgeState::Streaming(Box::new(ws))
                        }
                        Err(e) => BridgeState::Backoff(e),
                    }
                }
                BridgeState::Streaming(ws) => BridgeState::Backoff(self.stream(*ws).await),
                BridgeState::Backoff(BridgeError::HubStopped) => break,
                BridgeState::Backoff(err) => {
                    if self.hub.is_closed() {
                        break;
                    }
                    tracing::warn!(
                        error = %err,
                        retry_in_secs = self.retry_delay.as_secs_f64(),
                        "ledger event stream unavailable"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    BridgeState::Connecting
                }
            };
        }
        tracing::info!("ledger event bridge stopped");
    }

    async fn connect(&self) -> Result<LedgerStream, BridgeError> {
        let (mut ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|source| BridgeError::Connect {
                url: self.url.clone(),
                source,
            })?;
        for (id, kind) in (1u64..).zip(LedgerEventKind::ALL) {
            let request = subscribe_request(kind, id).to_string();
            ws.send(Message::Text(request.into()))
                .await
                .map_err(BridgeError::Subscribe)?;
            tracing::debug!(kind = kind.as_str(), id, "sent ledger subscription");
        }
        Ok(ws)
    }

    /// Pump records until the stream ends. Always returns the reason.
    async fn stream(&self, mut ws: LedgerStream) -> BridgeError {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Err(e) = self.handle_record(text.as_str()) {
                        return e;
                    }
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "ledger sent close frame");
                    return BridgeError::Closed;
                }
                Ok(_) => {}
                Err(e) => return BridgeError::Read(e),
            }
        }
        BridgeError::Closed
    }

    fn handle_record(&self, text: &str) -> Result<(), BridgeError> {
        match parse_record(text) {
            Ok(LedgerRecord::Ack) => {
                tracing::debug!("ledger subscription acknowledged");
            }
            Ok(LedgerRecord::Error(message)) => {
                tracing::warn!(%message, "ledger reported an error");
            }
            Ok(LedgerRecord::Refresh(refreshes)) => {
                if refreshes.is_empty() {
                    tracing::debug!("ledger event without a known game id");
                }
                for refresh in refreshes {
                    tracing::debug!(
                        game_id = %refresh.game_id,
                        kind = refresh.kind.as_str(),
                        "ledger event"
                    );
                    self.hub
                        .broadcast(refresh.game_id, EventKind::Ledger(refresh.kind))
                        .map_err(|_| BridgeError::HubStopped)?;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "undecodable ledger record");
            }
        }
        Ok(())
    }
}
