//! WebSocket session endpoint.
//!
//! Each connection is registered with the [`SessionManager`] under the
//! observer named by the `user` query parameter. Client frames become
//! [`SessionEvent`]s; closing the socket, for any reason, dispatches a
//! disconnect so every subscription of the connection is dropped.
//!
//! ```text
//! Client                  Session                     IdentityService
//!   ├─ subscribe ─────────▶ SessionEvent::Subscribe ───▶ schedule poll
//!   ├─ unsubscribe ───────▶ SessionEvent::Unsubscribe ─▶ remove
//!   │◀─ message frame ──── SessionManager::deliver ◀─── resolved
//!   └─ close ─────────────▶ SessionEvent::Disconnect ──▶ remove all
//! ```

use std::time::Duration;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{Sink, SinkExt, StreamExt};
use idrelay_core::dispatch::{DispatchOutcome, SessionEvent};
use tokio::{sync::mpsc, time::timeout};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::{ClientFrame, ErrorFrame, SessionParams};
use crate::server::AppState;

/// Largest client frame accepted, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 128 * 1024;

/// Longest a single outbound frame may take to be written before the
/// session is closed.
pub const SEND_TIME_LIMIT: Duration = Duration::from_secs(10);

/// Open a WebSocket session
#[utoipa::path(
    get,
    path = "/ws",
    params(SessionParams),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol"),
        (status = 400, description = "Missing user parameter")
    )
)]
pub async fn session(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
) -> Response {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state, params.user))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: String) {
    let (connection_id, outbound) = state.sessions.open(&user);
    info!("WebSocket session {} established for {}", connection_id, user);

    let (sender, mut receiver) = socket.split();

    let send_connection = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        let end = forward_frames(&send_connection, outbound, sender, SEND_TIME_LIMIT).await;
        debug!("Outbound stream of session {} ended: {:?}", send_connection, end);
    });

    let recv_state = state.clone();
    let recv_connection = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    if let Err(e) =
                        handle_frame(&recv_state, &recv_connection, &user, text.as_str())
                    {
                        if let Err(e) = reply_error(&recv_state, &recv_connection, &e) {
                            warn!("{}", e.status_and_message().1);
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    disconnect(&state, &connection_id);
    info!("WebSocket session {} closed", connection_id);
}

/// How an outbound frame stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardEnd {
    /// The session was closed on our side.
    Drained,
    /// Writing to the socket failed.
    SocketClosed,
    /// A frame was not written within the time limit.
    TimedOut,
}

/// Writes queued frames to the socket until the queue closes or a write
/// fails or stalls for longer than `send_time_limit`.
pub async fn forward_frames<S>(
    connection_id: &str,
    mut outbound: mpsc::Receiver<String>,
    mut sink: S,
    send_time_limit: Duration,
) -> ForwardEnd
where
    S: Sink<Message> + Unpin,
{
    while let Some(text) = outbound.recv().await {
        match timeout(send_time_limit, sink.send(Message::Text(text.into()))).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return ForwardEnd::SocketClosed,
            Err(_) => {
                warn!(
                    "Sending to session {} took longer than {:?}, closing it",
                    connection_id, send_time_limit
                );
                return ForwardEnd::TimedOut;
            }
        }
    }
    ForwardEnd::Drained
}

/// Applies one client frame received on `connection_id`.
pub fn handle_frame(
    state: &AppState,
    connection_id: &str,
    user: &str,
    text: &str,
) -> Result<DispatchOutcome, AppError> {
    let frame: ClientFrame = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Malformed frame: {}", e)))?;
    let subscription_id = match &frame {
        ClientFrame::Subscribe { id, .. } | ClientFrame::Unsubscribe { id } => id.clone(),
    };
    let event = match frame {
        ClientFrame::Subscribe {
            id,
            destination,
            identity_request_id,
        } => SessionEvent::Subscribe {
            connection_id: connection_id.to_string(),
            subscription_id: id,
            destination,
            request_id: identity_request_id,
            observer: Some(user.to_string()),
        },
        ClientFrame::Unsubscribe { id } => SessionEvent::Unsubscribe {
            connection_id: connection_id.to_string(),
            subscription_id: id,
        },
    };

    let outcome = state.service.dispatch(event)?;
    match &outcome {
        DispatchOutcome::Subscribed { .. } => {
            state.sessions.track_subscription(connection_id, &subscription_id);
        }
        DispatchOutcome::Removed(_) => {
            state.sessions.untrack_subscription(connection_id, &subscription_id);
        }
        DispatchOutcome::Ignored => {}
    }
    Ok(outcome)
}

/// Sends `error` back to the client as an error frame.
pub fn reply_error(state: &AppState, connection_id: &str, error: &AppError) -> Result<(), AppError> {
    let (_, message) = error.status_and_message();
    warn!("Rejected frame on session {}: {}", connection_id, message);
    let text = serde_json::to_string(&ErrorFrame { error: message })
        .map_err(|e| AppError::Internal(format!("Failed to encode error frame: {}", e)))?;
    state.sessions.send(connection_id, text).map_err(|e| {
        AppError::Internal(format!(
            "Failed to queue error frame on session {}: {:?}",
            connection_id, e
        ))
    })
}

/// Drops every subscription of the connection and forgets it.
pub fn disconnect(state: &AppState, connection_id: &str) {
    let outcome = state.service.dispatch(SessionEvent::Disconnect {
        connection_id: connection_id.to_string(),
    });
    debug!("Disconnect of {}: {:?}", connection_id, outcome);
    state.sessions.close(connection_id);
}
