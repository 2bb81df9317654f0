//! WebSocket endpoint for collaborative editing
//!
//! One connection is one pool client. Outgoing traffic is serialized through
//! a single send task so acks, remote operations and presence updates reach
//! the client in revision order.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use notehub_common::ot::TextOperation;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::pool::{DocSnapshot, NewClient, OnlineUser, PoolError, PoolEvent};
use crate::auth::MaybeUser;
use crate::db::notes;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Name shown for anonymous editors
const GUEST_NAME: &str = "Guest";

/// Messages from the editor
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Operation { revision: u64, operation: TextOperation },
    Refresh,
}

/// Messages to the editor
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Doc {
        content: String,
        revision: u64,
        users: Vec<OnlineUser>,
        editable: bool,
    },
    Ack {
        revision: u64,
    },
    Operation {
        revision: u64,
        operation: TextOperation,
        author: Option<Uuid>,
    },
    UserJoined {
        user: OnlineUser,
    },
    UserLeft {
        client_id: Uuid,
    },
    Deleted,
    Error {
        message: String,
    },
}

impl ServerMessage {
    fn doc(snapshot: DocSnapshot, editable: bool) -> Self {
        ServerMessage::Doc {
            content: snapshot.content,
            revision: snapshot.revision,
            users: snapshot.users,
            editable,
        }
    }
}

enum Outbound {
    Message(ServerMessage),
    Refresh,
}

type Sender = SplitSink<WebSocket, Message>;

async fn send_json(sender: &mut Sender, msg: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            error!("Failed to encode realtime message: {}", e);
            Ok(())
        }
    }
}

/// GET /realtime/:noteId
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    Path(note_id): Path<String>,
    user: MaybeUser,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    let note = notes::find_note(&state.db, &note_id)
        .await?
        .ok_or_else(ApiError::not_found)?;

    let user_id = user.id();
    if user_id.is_none() && !state.config.allow_anonymous_views {
        return Err(ApiError::forbidden());
    }
    if !note.can_view(user_id) {
        return Err(ApiError::forbidden());
    }

    let client = NewClient {
        user_id,
        name: user
            .0
            .as_ref()
            .map(|u| u.name().to_string())
            .unwrap_or_else(|| GUEST_NAME.to_string()),
        can_edit: note.can_edit(user_id, state.config.allow_anonymous_edits),
    };
    let id = note.id;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, id, client))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState, note_id: Uuid, client: NewClient) {
    let (mut sender, mut receiver) = socket.split();

    let session = match state.pool.join(note_id, client).await {
        Ok(session) => session,
        Err(e) => {
            warn!(note_id = %note_id, "Realtime join rejected: {}", e);
            let _ = send_json(&mut sender, &ServerMessage::Error { message: e.to_string() }).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let client_id = session.client_id;
    let can_edit = session.can_edit;
    let mut events = session.events;
    let cancel = session.cancel;
    let snapshot = session.snapshot;

    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(32);

    let pool = state.pool.clone();
    let mut send_task = tokio::spawn(async move {
        let mut last_revision = snapshot.revision;
        if send_json(&mut sender, &ServerMessage::doc(snapshot, can_edit)).await.is_err() {
            return;
        }

        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = send_json(&mut sender, &ServerMessage::Deleted).await;
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                out = out_rx.recv() => match out {
                    Some(Outbound::Message(msg)) => msg,
                    Some(Outbound::Refresh) => match pool.snapshot(note_id).await {
                        Some(snapshot) => {
                            last_revision = snapshot.revision;
                            ServerMessage::doc(snapshot, can_edit)
                        }
                        None => break,
                    },
                    None => break,
                },
                event = events.recv() => match event {
                    Ok(PoolEvent::Operation { origin, revision, operation, user_id }) => {
                        if revision <= last_revision {
                            continue;
                        }
                        last_revision = revision;
                        if origin == client_id {
                            ServerMessage::Ack { revision }
                        } else {
                            ServerMessage::Operation { revision, operation, author: user_id }
                        }
                    }
                    Ok(PoolEvent::UserJoined(user)) => {
                        if user.client_id == client_id {
                            continue;
                        }
                        ServerMessage::UserJoined { user }
                    }
                    Ok(PoolEvent::UserLeft { client_id: left }) => {
                        if left == client_id {
                            continue;
                        }
                        ServerMessage::UserLeft { client_id: left }
                    }
                    Ok(PoolEvent::Deleted) => {
                        let _ = send_json(&mut sender, &ServerMessage::Deleted).await;
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(note_id = %note_id, missed, "Realtime client lagged, resending document");
                        match pool.snapshot(note_id).await {
                            Some(snapshot) => {
                                last_revision = snapshot.revision;
                                ServerMessage::doc(snapshot, can_edit)
                            }
                            None => break,
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            if send_json(&mut sender, &msg).await.is_err() {
                break;
            }
        }
    });

    let pool = state.pool.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let reply = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Operation { revision, operation }) => {
                    match pool.apply_operation(note_id, client_id, revision, operation).await {
                        Ok(_) => None,
                        Err(PoolError::Closed) => break,
                        Err(e) => {
                            debug!(note_id = %note_id, client_id = %client_id, "Operation rejected: {}", e);
                            Some(Outbound::Message(ServerMessage::Error { message: e.to_string() }))
                        }
                    }
                }
                Ok(ClientMessage::Refresh) => Some(Outbound::Refresh),
                Err(e) => Some(Outbound::Message(ServerMessage::Error {
                    message: format!("invalid message: {}", e),
                })),
            };

            if let Some(reply) = reply {
                if out_tx.send(reply).await.is_err() {
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.pool.leave(note_id, client_id).await;
    info!(note_id = %note_id, client_id = %client_id, "Realtime connection closed");
}
