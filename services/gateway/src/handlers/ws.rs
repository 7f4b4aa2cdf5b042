use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::rate_limit::{WS_CONNECT, WS_MESSAGE};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use matchmaker::protocol::{ServerMessage, parse_client_message};
use matchmaker::{ConnectionHandle, Outbound};
use types::ids::UserId;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Response, AppError> {
    if !state.coordinator.is_healthy() {
        return Err(AppError::ServiceUnavailable("matchmaking is unavailable".into()));
    }
    state.rate_limiter.check(&user.user_id, &WS_CONNECT)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user.user_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: UserId) {
    let (mut sender, mut receiver) = socket.split();
    let (handle, mut outbound) = ConnectionHandle::channel();
    let connection = handle.id;
    let replies = handle.clone();

    // Writer: drains everything the coordinator queues for this connection
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            match frame {
                Outbound::Message(msg) => {
                    if sender.send(Message::Text(msg.to_json().into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { reason } => {
                    let close = CloseFrame {
                        code: close_code::NORMAL,
                        reason: reason.into(),
                    };
                    let _ = sender.send(Message::Close(Some(close))).await;
                    break;
                }
            }
        }
    });

    if let Err(e) = state.coordinator.connect(user.clone(), handle).await {
        tracing::warn!(user = %user, error = %e, "connect failed");
        replies.send(ServerMessage::error(e.to_string()));
    }

    loop {
        tokio::select! {
            // Writer stops on a close request or a dead socket
            _ = &mut writer => break,
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_text(&state, &user, &replies, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(user = %user, error = %e, "websocket read failed");
                    break;
                }
            },
        }
    }

    writer.abort();
    if let Err(e) = state.coordinator.disconnect(&user, connection).await {
        tracing::warn!(user = %user, error = %e, "disconnect cleanup failed");
    }
}

async fn handle_text(state: &AppState, user: &UserId, replies: &ConnectionHandle, text: &str) {
    if let Err(e) = state.rate_limiter.check(user, &WS_MESSAGE) {
        replies.send(ServerMessage::error(e.to_string()));
        return;
    }

    let msg = match parse_client_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(user = %user, error = %e, "malformed message");
            replies.send(ServerMessage::error(format!("malformed message: {}", e)));
            return;
        }
    };

    if let Err(e) = state.coordinator.handle_message(user, msg).await {
        tracing::debug!(user = %user, error = %e, "message rejected");
        replies.send(ServerMessage::error(e.to_string()));
    }
}
