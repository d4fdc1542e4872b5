//! Viewer websocket.
//!
//! The socket is send-only: the server pushes the full visible transcript as
//! a JSON array whenever it changes. Anything the client sends is logged and
//! ignored.

use axum::{
    extract::{
        ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{ApiResult, AppState};
use crate::error::SessionError;
use crate::session::{
    Outbound, RoomMode, ScreenName, SessionController, ViewerInfo, DUPLICATE_EXECUTOR_CLOSE_CODE,
    DUPLICATE_EXECUTOR_REASON,
};

#[derive(Debug, Deserialize)]
pub struct ChatParams {
    pub room_id: u64,
    pub chat_room_mode: RoomMode,
    pub screen_name: ScreenName,
}

/// GET /ws/chat?room_id&chat_room_mode&screen_name
pub async fn chat_socket(
    State(state): State<AppState>,
    Query(params): Query<ChatParams>,
    upgrade: WebSocketUpgrade,
) -> ApiResult<Response> {
    let session = state.registry.session(params.room_id).await.map_err(|e| {
        tracing::error!(room_id = params.room_id, "Websocket rejected: room not found");
        e
    })?;
    let info = ViewerInfo {
        room_id: params.room_id,
        mode: params.chat_room_mode,
        screen: params.screen_name,
        accepted_at: state.registry.now(),
    };
    Ok(upgrade.on_upgrade(move |socket| serve_viewer(socket, session, info)))
}

fn to_frame(outbound: Outbound) -> WsMessage {
    match outbound {
        Outbound::Snapshot(json) => WsMessage::Text(json.into()),
        Outbound::Close { code, reason } => WsMessage::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })),
    }
}

async fn serve_viewer(socket: WebSocket, session: Arc<SessionController>, info: ViewerInfo) {
    let (mut sink, mut incoming) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let room_id = info.room_id;

    let id = match session.connect(info, tx).await {
        Ok(id) => id,
        Err(SessionError::DuplicateExecutor) => {
            let close = Outbound::Close {
                code: DUPLICATE_EXECUTOR_CLOSE_CODE,
                reason: DUPLICATE_EXECUTOR_REASON.to_string(),
            };
            if let Err(e) = sink.send(to_frame(close)).await {
                tracing::debug!(room_id, error = %e, "Close frame not delivered");
            }
            return;
        }
        Err(e) => {
            tracing::error!(room_id, error = %e, "Viewer registration failed");
            return;
        }
    };

    let mut outbound_frames = UnboundedReceiverStream::new(rx);
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = outbound_frames.next().await {
            let closing = matches!(outbound, Outbound::Close { .. });
            if sink.send(to_frame(outbound)).await.is_err() || closing {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = incoming.next().await {
            match frame {
                WsMessage::Close(_) => break,
                WsMessage::Text(text) => {
                    tracing::warn!(room_id, text = %text.as_str(), "Unexpected message from viewer");
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    session.disconnect(&id).await;
    tracing::info!(room_id, connection = %id, "Viewer disconnected");
}
