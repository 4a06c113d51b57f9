//! WebSocket handler — one whiteboard participant per connection.
//!
//! DESIGN
//! ======
//! On upgrade the connection joins its poll's `WhiteboardChannel` through a
//! fresh storage tab and enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall
//! - Channel view changes → push `whiteboard:state`
//!
//! Dispatch is synchronous and returns the frames for the sender, so tests
//! can drive it without a socket.
//!
//! A participant id is live at most once per poll: a second upgrade with the
//! same `(poll_id, participant_id)` is refused with `409 Conflict` until the
//! first connection closes.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → claim session → join channel → send `session:connected`,
//!    then current state
//! 2. Client frames → `done` or `error` reply; view changes → state push
//! 3. Close → leave channel (heartbeat removed, pending elements flushed),
//!    then release the session claim

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};
use uuid::Uuid;

use crate::channel::{ChannelView, Participant, WhiteboardChannel};
use crate::element::{ElementError, WhiteboardElement};
use crate::frame::{Data, ErrorCode, Frame, Status};
use crate::state::{AppState, SessionClaim};

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;

const DEFAULT_PARTICIPANT_NAME: &str = "Anonymous";

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("invalid element: {0}")]
    InvalidElement(#[from] ElementError),
    #[error("unknown syscall: {0}")]
    UnknownSyscall(String),
}

impl ErrorCode for GatewayError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "E_MISSING_FIELD",
            Self::Malformed(_) => "E_MALFORMED",
            Self::InvalidElement(_) => "E_INVALID_ELEMENT",
            Self::UnknownSyscall(_) => "E_UNKNOWN_SYSCALL",
        }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let non_empty = |key: &str| params.get(key).filter(|v| !v.trim().is_empty()).cloned();

    let Some(poll_id) = non_empty("poll_id") else {
        return (StatusCode::BAD_REQUEST, "poll_id required").into_response();
    };
    let participant = Participant::new(
        non_empty("participant_id").unwrap_or_else(|| Uuid::new_v4().to_string()),
        non_empty("name").unwrap_or_else(|| DEFAULT_PARTICIPANT_NAME.to_owned()),
    );

    let Some(claim) = state.claim_session(&poll_id, &participant.id) else {
        warn!(%poll_id, participant_id = %participant.id, "ws: duplicate participant refused");
        return (StatusCode::CONFLICT, "participant already connected").into_response();
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, poll_id, participant, claim))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(
    mut socket: WebSocket,
    state: AppState,
    poll_id: String,
    participant: Participant,
    claim: SessionClaim,
) {
    let tab = state.tab();
    let origin = tab.origin();
    let mut channel = WhiteboardChannel::join(Arc::new(tab), poll_id.clone(), participant, state.config);
    let mut view_rx = channel.subscribe();
    let participant_id = channel.participant().id.clone();

    let welcome = Frame::request("session:connected", Data::new())
        .with_poll_id(&poll_id)
        .with_data("participant_id", participant_id.clone())
        .with_data("color", channel.element_color());
    let initial = state_frame(&poll_id, &view_rx.borrow_and_update().clone());
    if send_frame(&mut socket, &welcome).await.is_err() || send_frame(&mut socket, &initial).await.is_err() {
        return;
    }

    info!(%poll_id, %participant_id, %origin, "ws: participant connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&channel, &text);
                        let mut failed = false;
                        for frame in &replies {
                            if send_frame(&mut socket, frame).await.is_err() {
                                failed = true;
                                break;
                            }
                        }
                        if failed {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = view_rx.borrow_and_update().clone();
                if send_frame(&mut socket, &state_frame(&poll_id, &view)).await.is_err() {
                    break;
                }
            }
        }
    }

    channel.leave();
    drop(claim);
    info!(
        %poll_id,
        %participant_id,
        storage_bytes = state.store.used_bytes(),
        "ws: participant disconnected"
    );
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
fn process_inbound_text(channel: &WhiteboardChannel, text: &str) -> Vec<Frame> {
    let req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "ws: invalid inbound frame");
            let err = GatewayError::Malformed(format!("invalid json: {e}"));
            return vec![Frame::request("gateway:error", Data::new()).error_from(&err)];
        }
    };

    match dispatch(channel, &req) {
        Ok(()) => vec![req.done()],
        Err(e) => vec![req.error_from(&e)],
    }
}

fn dispatch(channel: &WhiteboardChannel, req: &Frame) -> Result<(), GatewayError> {
    match req.syscall.as_str() {
        "element:broadcast" => {
            let raw = req.data.get("element").ok_or(GatewayError::MissingField("element"))?;
            channel.broadcast_element(parse_element(raw)?);
            Ok(())
        }
        "elements:replace" => {
            let raw = req.data.get("elements").ok_or(GatewayError::MissingField("elements"))?;
            let Some(list) = raw.as_array() else {
                return Err(GatewayError::Malformed("elements must be an array".into()));
            };
            let elements = list.iter().map(parse_element).collect::<Result<Vec<_>, _>>()?;
            channel.broadcast_elements(elements);
            Ok(())
        }
        other => Err(GatewayError::UnknownSyscall(other.to_owned())),
    }
}

fn parse_element(raw: &serde_json::Value) -> Result<WhiteboardElement, GatewayError> {
    let element: WhiteboardElement =
        serde_json::from_value(raw.clone()).map_err(|e| GatewayError::Malformed(e.to_string()))?;
    let element = element.normalize();
    element.validate()?;
    Ok(element)
}

fn state_frame(poll_id: &str, view: &ChannelView) -> Frame {
    Frame::request("whiteboard:state", Data::new())
        .with_poll_id(poll_id)
        .with_data("elements", serde_json::json!(view.elements))
        .with_data("connected_participants", serde_json::json!(view.connected_participants))
        .with_data("is_connected", view.is_connected)
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame.data.get("code").and_then(|v| v.as_str()).unwrap_or("-");
        let message = frame.data.get("message").and_then(|v| v.as_str()).unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}
