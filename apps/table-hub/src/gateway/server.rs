//! WebSocket upgrade handler and per-connection pumps.
//!
//! Each connection runs a reader (inline) and a writer (spawned task). The
//! reader decodes client requests and forwards them to the hub; the writer
//! drains the connection's outbound queue. Replies that concern only this
//! socket (pong, validation errors) travel from reader to writer over a small
//! control lane so the hub stays the only producer on the outbound queue.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::AppState;

use super::events::{ClientRequest, Frame, GameUpdate};
use super::hub::{HubClosed, HubHandle};
use super::session::{ConnectionHandle, ConnectionId};

/// Close codes.
const CLOSE_NORMAL: u16 = 1000;
const CLOSE_INTERNAL_ERROR: u16 = 1011;

const CONTROL_CAPACITY: usize = 16;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let config = state.config.clone();
    let (handle, outbound) = ConnectionHandle::channel(config.outbound_capacity);
    let conn = handle.id.clone();

    let (mut ws_tx, ws_rx) = socket.split();
    if state.hub.register(handle).is_err() {
        let _ = send_close(&mut ws_tx, CLOSE_INTERNAL_ERROR, "hub unavailable").await;
        return;
    }
    tracing::info!(conn_id = %conn, "client connected");

    let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
    let mut writer = tokio::spawn(write_pump(
        conn.clone(),
        ws_tx,
        outbound,
        control_rx,
        config.keepalive_interval,
        config.write_timeout,
    ));

    let mut writer_finished = false;
    tokio::select! {
        _ = read_pump(&conn, &state.hub, ws_rx, control_tx, config.read_timeout) => {}
        _ = &mut writer => writer_finished = true,
    }

    // Dropping the hub's entry closes the outbound queue, which lets a still
    // running writer send its close frame and exit.
    let _ = state.hub.unregister(conn.clone());
    if !writer_finished && time::timeout(config.write_timeout, &mut writer).await.is_err() {
        writer.abort();
    }

    tracing::info!(conn_id = %conn, "client disconnected");
}

/// Read client frames until the socket closes, errors, or goes quiet for
/// longer than `read_timeout`. Any inbound frame refreshes the deadline.
async fn read_pump(
    conn: &ConnectionId,
    hub: &HubHandle,
    mut ws_rx: SplitStream<WebSocket>,
    control: mpsc::Sender<GameUpdate>,
    read_timeout: Duration,
) {
    loop {
        let msg = match time::timeout(read_timeout, ws_rx.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::debug!(conn_id = %conn, ?e, "ws read error");
                return;
            }
            Ok(None) => return,
            Err(_) => {
                tracing::debug!(conn_id = %conn, "read deadline exceeded");
                return;
            }
        };

        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => return,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => continue,
        };

        if dispatch(conn, hub, &control, text.as_str()).is_err() {
            tracing::warn!(conn_id = %conn, "hub stopped, dropping connection");
            return;
        }
    }
}

fn dispatch(
    conn: &ConnectionId,
    hub: &HubHandle,
    control: &mpsc::Sender<GameUpdate>,
    text: &str,
) -> Result<(), HubClosed> {
    match ClientRequest::decode(text) {
        Ok(ClientRequest::Subscribe { game_id, viewer }) => hub.subscribe(conn.clone(), game_id, viewer),
        Ok(ClientRequest::Unsubscribe { game_id }) => hub.unsubscribe(conn.clone(), game_id),
        Ok(ClientRequest::Ping { game_id }) => {
            reply(conn, control, GameUpdate::pong(game_id));
            Ok(())
        }
        Ok(ClientRequest::Action(intent)) => hub.relay_action(conn.clone(), intent),
        Err(err) => {
            match err.reply() {
                Some(update) => reply(conn, control, update),
                None => tracing::debug!(conn_id = %conn, error = %err, "discarding client message"),
            }
            Ok(())
        }
    }
}

fn reply(conn: &ConnectionId, control: &mpsc::Sender<GameUpdate>, update: GameUpdate) {
    if control.try_send(update).is_err() {
        tracing::debug!(conn_id = %conn, "control lane full, dropping reply");
    }
}

/// Write queued envelopes, control replies and keep-alive pings until the
/// outbound queue closes or a write fails or stalls.
async fn write_pump(
    conn: ConnectionId,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Frame>,
    mut control: mpsc::Receiver<GameUpdate>,
    keepalive: Duration,
    write_timeout: Duration,
) {
    // Pings run on a fixed schedule; data frames do not postpone them, so a
    // client that only listens still has something to answer.
    let mut ping = time::interval_at(Instant::now() + keepalive, keepalive);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut control_open = true;

    loop {
        let msg = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => Message::Text(frame.to_string().into()),
                None => {
                    let _ = time::timeout(
                        write_timeout,
                        send_close(&mut ws_tx, CLOSE_NORMAL, "subscription closed"),
                    )
                    .await;
                    break;
                }
            },
            update = control.recv(), if control_open => match update {
                Some(update) => match update.to_frame() {
                    Ok(frame) => Message::Text(frame.to_string().into()),
                    Err(e) => {
                        tracing::error!(conn_id = %conn, error = %e, "failed to encode reply");
                        continue;
                    }
                },
                None => {
                    control_open = false;
                    continue;
                }
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        match time::timeout(write_timeout, ws_tx.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(conn_id = %conn, ?e, "ws write error");
                break;
            }
            Err(_) => {
                tracing::debug!(conn_id = %conn, "write deadline exceeded");
                break;
            }
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
