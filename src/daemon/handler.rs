//! Message dispatch and request handling.
//!
//! Pure logic: no I/O. Each handler takes a mutable reference to
//! [`DaemonState`] and returns the response for the requesting connection.
//! Pushed events reach subscribers through their own channels.

use crate::context::Clock;
use crate::ipc::protocol::{Message, PROTOCOL_VERSION, Status};

use super::state::{ConnectionId, DaemonState};

/// Dispatch a request message to the appropriate handler.
///
/// Server-originated variants are answered with `unknown_type`.
pub fn handle_message<C: Clock>(
    state: &mut DaemonState<C>,
    request: Message,
    connection_id: ConnectionId,
) -> Message {
    match request {
        Message::Hello { id, version } => handle_hello(id, version),
        Message::GetContext { id } => Message::Response {
            id,
            status: Status::Ok,
            error: None,
            context: Some(state.context()),
            compositor: None,
        },
        Message::RecordLaunch { id, app_id } => handle_record_launch(state, id, &app_id),
        Message::GetStatus { id } => Message::Response {
            id,
            status: Status::Ok,
            error: None,
            context: None,
            compositor: Some(state.status()),
        },
        Message::Subscribe { id } => match state.subscribe(connection_id) {
            Ok(()) => Message::ok(id),
            Err(reason) => Message::error(id, reason),
        },
        Message::Unsubscribe { id } => {
            state.unsubscribe(connection_id);
            Message::ok(id)
        }
        Message::HelloAck { id, .. } | Message::Response { id, .. } | Message::Event { id, .. } => {
            Message::error(id, "unknown_type")
        }
    }
}

fn handle_hello(id: u32, version: u32) -> Message {
    if id != 0 {
        return hello_error("invalid_hello_id");
    }
    if version != PROTOCOL_VERSION {
        return hello_error("version_mismatch");
    }
    Message::HelloAck {
        id: 0,
        version: PROTOCOL_VERSION,
        status: Status::Ok,
        error: None,
    }
}

fn hello_error(reason: &str) -> Message {
    Message::HelloAck {
        id: 0,
        version: PROTOCOL_VERSION,
        status: Status::Error,
        error: Some(reason.into()),
    }
}

fn handle_record_launch<C: Clock>(state: &mut DaemonState<C>, id: u32, app_id: &str) -> Message {
    if app_id.is_empty() {
        return Message::error(id, "empty_app_id");
    }
    state.record_launch(app_id);
    Message::ok(id)
}
