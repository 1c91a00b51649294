//! Niri IPC: JSON request/reply and event stream on `$NIRI_SOCKET`.
//!
//! Each request is a JSON string on its own line (`"Windows"`); the reply
//! is one line, `{"Ok": {"Windows": [...]}}` or `{"Err": "..."}`. After
//! `"EventStream"` the connection delivers one event object per line,
//! keyed by event name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;

use crate::compositor::CompositorError;
use crate::compositor::factory::{Backoff, FeedSender, read_line_lossy};
use crate::events::RawEvent;

use super::{NiriBackend, NiriOutput, NiriWindow, NiriWorkspace};

#[derive(Debug, Deserialize)]
enum Reply {
    Ok(Value),
    Err(String),
}

/// Extract the payload of a reply line for the given request variant.
///
/// Unit replies such as `{"Ok": "Handled"}` yield the bare value.
pub fn unwrap_reply(line: &str, variant: &str) -> Result<Value, CompositorError> {
    match serde_json::from_str::<Reply>(line)? {
        Reply::Ok(Value::Object(mut map)) => Ok(map.remove(variant).unwrap_or(Value::Null)),
        Reply::Ok(other) => Ok(other),
        Reply::Err(message) => Err(CompositorError::Reply(message)),
    }
}

async fn send_request(
    socket: &Path,
    variant: &str,
) -> Result<Lines<BufReader<UnixStream>>, CompositorError> {
    let mut stream = UnixStream::connect(socket).await?;
    let mut line = serde_json::to_string(variant)?;
    line.push('\n');
    stream.write_all(line.as_bytes()).await?;
    Ok(BufReader::new(stream).lines())
}

/// Send one request and decode its payload.
pub async fn request<T: DeserializeOwned>(
    socket: &Path,
    variant: &str,
) -> Result<T, CompositorError> {
    let mut lines = send_request(socket, variant).await?;
    let line = lines
        .next_line()
        .await?
        .ok_or(CompositorError::StreamClosed)?;
    let payload = unwrap_reply(&line, variant)?;
    Ok(serde_json::from_value(payload)?)
}

/// Fetch outputs, workspaces, windows and the focused output.
pub async fn fetch(socket: &Path) -> Result<NiriBackend, CompositorError> {
    let outputs: HashMap<String, NiriOutput> = request(socket, "Outputs").await?;
    let workspaces: Vec<NiriWorkspace> = request(socket, "Workspaces").await?;
    let windows: Vec<NiriWindow> = request(socket, "Windows").await?;
    let focused: Option<NiriOutput> = request(socket, "FocusedOutput").await?;
    Ok(NiriBackend::from_parts(outputs, workspaces, windows, focused))
}

/// Name of an event-stream line (its single top-level key).
pub fn event_name(line: &str) -> Option<String> {
    match serde_json::from_str::<Value>(line).ok()? {
        Value::Object(map) => map.keys().next().cloned(),
        _ => None,
    }
}

/// Events republished as `windowschanged`.
pub fn is_window_list_event(name: &str) -> bool {
    matches!(
        name,
        "WindowsChanged" | "WindowOpenedOrChanged" | "WindowClosed"
    )
}

/// Events after which the cached state is re-fetched.
pub fn affects_state(name: &str) -> bool {
    is_window_list_event(name)
        || matches!(
            name,
            "WorkspacesChanged" | "WorkspaceActivated" | "WindowFocusChanged"
        )
}

/// Run the Niri feed until the daemon loop goes away.
pub async fn run_feed(socket: PathBuf, sender: FeedSender) {
    let mut backoff = Backoff::new();
    loop {
        match stream_events(&socket, &sender, &mut backoff).await {
            Ok(()) => {
                tracing::debug!("niri feed stopped, daemon gone");
                return;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!(error = %e, retry_ms = delay.as_millis() as u64, "niri feed interrupted");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn stream_events(
    socket: &Path,
    sender: &FeedSender,
    backoff: &mut Backoff,
) -> Result<(), CompositorError> {
    if !sender.state(Box::new(fetch(socket).await?)) {
        return Ok(());
    }

    let mut reader = send_request(socket, "EventStream").await?.into_inner();
    let mut buf = Vec::new();
    let ack = read_line_lossy(&mut reader, &mut buf)
        .await?
        .ok_or(CompositorError::StreamClosed)?;
    unwrap_reply(&ack, "EventStream")?;
    tracing::info!(path = %socket.display(), "subscribed to niri event stream");
    backoff.reset();

    while let Some(line) = read_line_lossy(&mut reader, &mut buf).await? {
        let Some(name) = event_name(&line) else {
            tracing::trace!(line = %line, "ignoring malformed niri event");
            continue;
        };

        if is_window_list_event(&name) && !sender.event(RawEvent::WindowsChanged) {
            return Ok(());
        }

        if affects_state(&name) {
            match fetch(socket).await {
                Ok(backend) => {
                    if !sender.state(Box::new(backend)) {
                        return Ok(());
                    }
                }
                Err(e) => tracing::debug!(error = %e, "niri refresh failed"),
            }
        }
    }

    Err(CompositorError::StreamClosed)
}
