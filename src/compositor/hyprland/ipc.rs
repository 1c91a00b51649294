//! Hyprland IPC: request socket and event socket.
//!
//! Requests go to `.socket.sock`, one command per connection, reply read
//! to EOF. Events arrive on `.socket2.sock` as `NAME>>DATA` lines. State
//! is re-fetched whenever an event can change monitors, workspaces or
//! windows.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::compositor::factory::{Backoff, FeedSender, read_line_lossy};
use crate::compositor::{CompositorError, CompositorKind};
use crate::events::RawEvent;

use super::{Client, HyprlandBackend, Monitor, WorkspaceInfo};

const REQUEST_SOCKET: &str = ".socket.sock";
const EVENT_SOCKET: &str = ".socket2.sock";

/// Resolve the socket directory for an instance signature.
///
/// Newer Hyprland uses `$XDG_RUNTIME_DIR/hypr/<sig>`, older `/tmp/hypr/<sig>`.
pub fn socket_dir(signature: &str) -> Result<PathBuf, CompositorError> {
    let mut candidates = Vec::with_capacity(2);
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        candidates.push(PathBuf::from(runtime).join("hypr").join(signature));
    }
    candidates.push(PathBuf::from("/tmp/hypr").join(signature));

    candidates
        .into_iter()
        .find(|dir| dir.join(REQUEST_SOCKET).exists())
        .ok_or(CompositorError::NoSocket(CompositorKind::Hyprland))
}

/// Send one command and read the whole reply.
pub async fn request(dir: &Path, command: &str) -> Result<Vec<u8>, CompositorError> {
    let mut stream = UnixStream::connect(dir.join(REQUEST_SOCKET)).await?;
    stream.write_all(command.as_bytes()).await?;
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    Ok(reply)
}

async fn request_json<T: DeserializeOwned>(dir: &Path, command: &str) -> Result<T, CompositorError> {
    let reply = request(dir, command).await?;
    Ok(serde_json::from_slice(&reply)?)
}

/// Fetch monitors, workspaces and clients and build a fresh backend.
pub async fn fetch(dir: &Path) -> Result<HyprlandBackend, CompositorError> {
    let monitors: Vec<Monitor> = request_json(dir, "j/monitors").await?;
    let workspaces: Vec<WorkspaceInfo> = request_json(dir, "j/workspaces").await?;
    let clients: Vec<Client> = request_json(dir, "j/clients").await?;
    Ok(HyprlandBackend::from_parts(monitors, workspaces, clients))
}

/// Split an event line into `(name, data)`.
pub fn parse_event_line(line: &str) -> Option<(&str, &str)> {
    let (name, data) = line.split_once(">>")?;
    if name.is_empty() {
        return None;
    }
    Some((name, data))
}

/// Whether an event can change the cached tree.
pub fn affects_state(name: &str) -> bool {
    matches!(
        name,
        "workspace"
            | "workspacev2"
            | "focusedmon"
            | "focusedmonv2"
            | "createworkspace"
            | "createworkspacev2"
            | "destroyworkspace"
            | "destroyworkspacev2"
            | "moveworkspace"
            | "moveworkspacev2"
            | "renameworkspace"
            | "activespecial"
            | "activespecialv2"
            | "openwindow"
            | "closewindow"
            | "movewindow"
            | "movewindowv2"
            | "monitoradded"
            | "monitoraddedv2"
            | "monitorremoved"
            | "monitorremovedv2"
            | "configreloaded"
    )
}

/// Run the Hyprland feed until the daemon loop goes away.
///
/// Connection failures are retried with backoff; the daemon keeps serving
/// the last state it received in the meantime.
pub async fn run_feed(signature: String, sender: FeedSender) {
    feed_loop(move || socket_dir(&signature), sender).await;
}

/// Retry loop around [`stream_events`]. The socket directory is resolved
/// again before every attempt.
async fn feed_loop<F>(resolve_dir: F, sender: FeedSender)
where
    F: Fn() -> Result<PathBuf, CompositorError>,
{
    let mut backoff = Backoff::new();
    loop {
        let session = match resolve_dir() {
            Ok(dir) => stream_events(&dir, &sender, &mut backoff).await,
            Err(e) => Err(e),
        };
        match session {
            Ok(()) => {
                tracing::debug!("hyprland feed stopped, daemon gone");
                return;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!(error = %e, retry_ms = delay.as_millis() as u64, "hyprland feed interrupted");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// One connected session of the feed. `Ok(())` means the receiver closed.
async fn stream_events(
    dir: &Path,
    sender: &FeedSender,
    backoff: &mut Backoff,
) -> Result<(), CompositorError> {
    if !sender.state(Box::new(fetch(dir).await?)) {
        return Ok(());
    }

    let stream = UnixStream::connect(dir.join(EVENT_SOCKET)).await?;
    tracing::info!(path = %dir.display(), "connected to hyprland event socket");
    backoff.reset();

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    while let Some(line) = read_line_lossy(&mut reader, &mut buf).await? {
        let Some((name, data)) = parse_event_line(&line) else {
            tracing::trace!(line = %line, "ignoring malformed hyprland event");
            continue;
        };

        let refresh = affects_state(name);
        let event = RawEvent::Named {
            name: name.to_string(),
            data: data.to_string(),
        };
        if !sender.event(event) {
            return Ok(());
        }

        if refresh {
            match fetch(dir).await {
                Ok(backend) => {
                    if !sender.state(Box::new(backend)) {
                        return Ok(());
                    }
                }
                Err(e) => tracing::debug!(error = %e, "hyprland refresh failed"),
            }
        }
    }

    Err(CompositorError::StreamClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::CompositorBackend;
    use crate::compositor::factory::{BackendUpdate, UpdateKind};
    use std::time::Duration;
    use tokio::net::UnixListener;
    use tokio::sync::mpsc;

    #[test]
    fn parse_event_lines() {
        assert_eq!(parse_event_line("workspace>>3"), Some(("workspace", "3")));
        assert_eq!(parse_event_line("dpms>>0,DP-1"), Some(("dpms", "0,DP-1")));
        assert_eq!(
            parse_event_line("activewindow>>kitty,~ >> zsh"),
            Some(("activewindow", "kitty,~ >> zsh"))
        );
        assert_eq!(parse_event_line("configreloaded>>"), Some(("configreloaded", "")));
    }

    #[test]
    fn reject_malformed_lines() {
        assert_eq!(parse_event_line("no separator"), None);
        assert_eq!(parse_event_line(">>data"), None);
    }

    #[test]
    fn state_events() {
        assert!(affects_state("workspacev2"));
        assert!(affects_state("openwindow"));
        assert!(affects_state("monitorremoved"));
        assert!(!affects_state("dpms"));
        assert!(!affects_state("activewindow"));
    }

    /// Serve canned replies on a fake request socket.
    async fn serve_replies(dir: &Path) {
        let listener = UnixListener::bind(dir.join(REQUEST_SOCKET)).unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 64];
                let n = stream.read(&mut buf).await.unwrap();
                let reply = match &buf[..n] {
                    b"j/monitors" => {
                        r#"[{"name":"DP-1","scale":2.0,"focused":true,"activeWorkspace":{"id":2,"name":"2"}}]"#
                    }
                    b"j/workspaces" => r#"[{"id":2,"name":"2","monitor":"DP-1"}]"#,
                    b"j/clients" => r#"[{"class":"Kitty","workspace":{"id":2,"name":"2"}}]"#,
                    _ => "unknown request",
                };
                stream.write_all(reply.as_bytes()).await.unwrap();
            }
        });
    }

    #[tokio::test]
    async fn fetch_builds_backend_from_socket() {
        let dir = tempfile::tempdir().unwrap();
        serve_replies(dir.path()).await;

        let backend = fetch(dir.path()).await.unwrap();
        assert_eq!(backend.focused_output(), Some("DP-1"));
        assert_eq!(backend.output_scale("DP-1"), Some(2.0));
        assert_eq!(backend.current_workspace().id, 2);
        assert_eq!(backend.window_app_ids(), vec!["Kitty"]);
    }

    #[tokio::test]
    async fn request_without_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            request(dir.path(), "j/monitors").await,
            Err(CompositorError::Io(_))
        ));
    }

    /// Accept one event-socket client, write `payload`, keep it open.
    async fn serve_events(dir: &Path, payload: &'static [u8]) {
        let listener = UnixListener::bind(dir.join(EVENT_SOCKET)).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(payload).await.unwrap();
            std::future::pending::<()>().await;
        });
    }

    async fn next_update(rx: &mut mpsc::UnboundedReceiver<BackendUpdate>) -> UpdateKind {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("feed stalled")
            .expect("feed ended")
            .kind
    }

    fn named(update: UpdateKind) -> (String, String) {
        match update {
            UpdateKind::Event(RawEvent::Named { name, data }) => (name, data),
            other => panic!("expected named event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn feed_keeps_events_after_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        serve_replies(dir.path()).await;
        serve_events(
            dir.path(),
            b"activewindow>>xterm,caf\xe9\ndpms>>0,DP-1\ndpms>>1,DP-1\n",
        )
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let path = dir.path().to_path_buf();
        let feed = tokio::spawn(feed_loop(move || Ok(path.clone()), FeedSender::new(3, tx)));

        assert!(matches!(next_update(&mut rx).await, UpdateKind::State(_)));
        assert_eq!(
            named(next_update(&mut rx).await),
            ("activewindow".to_string(), "xterm,caf\u{FFFD}".to_string())
        );
        assert_eq!(
            named(next_update(&mut rx).await),
            ("dpms".to_string(), "0,DP-1".to_string())
        );
        assert_eq!(
            named(next_update(&mut rx).await),
            ("dpms".to_string(), "1,DP-1".to_string())
        );
        feed.abort();
    }

    #[tokio::test]
    async fn state_events_trigger_refetch() {
        let dir = tempfile::tempdir().unwrap();
        serve_replies(dir.path()).await;
        serve_events(dir.path(), b"garbage\nopenwindow>>80a0,2,kitty,kitty\n").await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let path = dir.path().to_path_buf();
        let feed = tokio::spawn(feed_loop(move || Ok(path.clone()), FeedSender::new(1, tx)));

        assert!(matches!(next_update(&mut rx).await, UpdateKind::State(_)));
        assert_eq!(named(next_update(&mut rx).await).0, "openwindow");
        match next_update(&mut rx).await {
            UpdateKind::State(backend) => assert_eq!(backend.window_app_ids(), vec!["Kitty"]),
            other => panic!("expected refreshed state, got {other:?}"),
        }
        feed.abort();
    }

    #[tokio::test]
    async fn feed_stops_when_daemon_goes_away() {
        let dir = tempfile::tempdir().unwrap();
        serve_replies(dir.path()).await;
        serve_events(dir.path(), b"").await;

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let path = dir.path().to_path_buf();
        tokio::time::timeout(
            Duration::from_secs(2),
            feed_loop(move || Ok(path.clone()), FeedSender::new(1, tx)),
        )
        .await
        .unwrap();
    }
}
