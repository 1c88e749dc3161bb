//! WebSocket upgrade and the session read/write pumps
//!
//! The reader enforces the pong deadline and dispatches frames into the
//! session; the writer drains the bounded outbound queue, pings on a
//! timer, and enforces the write deadline. Either pump failing tears the
//! session down: manager deregistration, bus unsubscribe-all, socket
//! close.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    Json,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::debug;

use types::ids::UserId;

use crate::auth;
use crate::session::{Session, PING_PERIOD, PONG_WAIT, WRITE_WAIT};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// `GET /ws`: upgrade to a client session. An invalid or missing token
/// yields an anonymous session limited to public topics.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let user_id = query
        .token
        .as_deref()
        .and_then(|token| auth::verify_token(&state.config.jwt_secret, token));
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// `GET /ws/stats`: connected clients and active topics.
pub async fn ws_stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "clients": state.sessions.count(),
        "topics": state.bus.active_topics(),
    }))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Option<UserId>) {
    let session = Session::new(user_id);
    state.sessions.register(session.clone());

    let (sender, receiver) = socket.split();
    let writer = tokio::spawn(write_pump(sender, session.clone()));

    read_pump(receiver, &session, &state).await;

    session.close();
    state.sessions.unregister(&session, &state);
    let _ = writer.await;
}

async fn read_pump(mut receiver: SplitStream<WebSocket>, session: &Arc<Session>, state: &AppState) {
    loop {
        let frame = match timeout(PONG_WAIT, receiver.next()).await {
            Err(_) => {
                debug!(session = %session.id, "read deadline exceeded");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(_))) => break,
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => session.handle_frame(text.as_str(), state),
            Message::Close(_) => break,
            // Pings and pongs reset the deadline simply by arriving.
            _ => {}
        }

        if session.is_closed() {
            break;
        }
    }
}

async fn write_pump(mut sender: SplitSink<WebSocket, Message>, session: Arc<Session>) {
    let mut ping = interval(PING_PERIOD);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ping.tick().await; // the first tick is immediate

    loop {
        tokio::select! {
            _ = session.wakeup() => {
                for envelope in session.drain() {
                    let Ok(text) = serde_json::to_string(&envelope) else {
                        continue;
                    };
                    match timeout(WRITE_WAIT, sender.send(Message::Text(text.into()))).await {
                        Ok(Ok(())) => {}
                        _ => {
                            session.close();
                            return;
                        }
                    }
                }
                if session.is_closed() {
                    let _ = sender.send(Message::Close(None)).await;
                    return;
                }
            }
            _ = ping.tick() => {
                let sent = timeout(WRITE_WAIT, sender.send(Message::Ping(Bytes::new()))).await;
                if !matches!(sent, Ok(Ok(()))) {
                    session.close();
                    return;
                }
            }
        }
    }
}
