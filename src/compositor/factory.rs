//! Backend factory and feed spawning.
//!
//! The only place that branches on [`CompositorKind`]. Callers get a boxed
//! backend plus, for live compositors, a feed task that streams
//! [`BackendUpdate`]s back to the daemon loop.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::RawEvent;

use super::hyprland::{self, HyprlandBackend};
use super::niri::{self, NiriBackend};
use super::noop::NoopBackend;
use super::{CompositorBackend, CompositorKind, EnvSignals};

const RECONNECT_INITIAL_MS: u64 = 1000;
const RECONNECT_MAX_MS: u64 = 30000;
const RECONNECT_MULTIPLIER: f64 = 1.5;

/// Message from a feed task to the daemon loop.
#[derive(Debug)]
pub struct BackendUpdate {
    /// Feed generation; updates from a replaced feed are dropped.
    pub generation: u64,
    pub kind: UpdateKind,
}

#[derive(Debug)]
pub enum UpdateKind {
    /// Freshly fetched backend state replacing the current one.
    State(Box<dyn CompositorBackend>),
    Event(RawEvent),
}

/// Sending half handed to feed tasks.
#[derive(Debug, Clone)]
pub struct FeedSender {
    generation: u64,
    tx: mpsc::UnboundedSender<BackendUpdate>,
}

impl FeedSender {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<BackendUpdate>) -> Self {
        Self { generation, tx }
    }

    /// Returns `false` once the daemon loop has gone away.
    pub fn state(&self, backend: Box<dyn CompositorBackend>) -> bool {
        self.send(UpdateKind::State(backend))
    }

    /// Returns `false` once the daemon loop has gone away.
    pub fn event(&self, event: RawEvent) -> bool {
        self.send(UpdateKind::Event(event))
    }

    fn send(&self, kind: UpdateKind) -> bool {
        self.tx
            .send(BackendUpdate {
                generation: self.generation,
                kind,
            })
            .is_ok()
    }
}

/// Exponential reconnect delay for feed tasks.
#[derive(Debug)]
pub struct Backoff {
    current_ms: u64,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            current_ms: RECONNECT_INITIAL_MS,
        }
    }

    pub fn reset(&mut self) {
        self.current_ms = RECONNECT_INITIAL_MS;
    }

    /// Delay to wait now; the following delay grows up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_millis(self.current_ms);
        let grown = (self.current_ms as f64 * RECONNECT_MULTIPLIER) as u64;
        self.current_ms = grown.min(RECONNECT_MAX_MS);
        delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Read one `\n`-terminated line from a feed socket. `Ok(None)` at EOF.
///
/// Invalid UTF-8 (X11 window titles) is replaced rather than treated as
/// a stream error, so the events queued behind it still arrive.
pub async fn read_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Create the backend for a detected kind, with no state yet.
pub fn create_backend(kind: CompositorKind) -> Box<dyn CompositorBackend> {
    tracing::info!(compositor = %kind, "creating compositor backend");
    match kind {
        CompositorKind::Hyprland => Box::new(HyprlandBackend::empty()),
        CompositorKind::Niri => Box::new(NiriBackend::empty()),
        CompositorKind::Unknown => Box::new(NoopBackend),
    }
}

/// Spawn the IPC feed for a detected kind. `None` for Unknown.
pub fn spawn_feed(
    kind: CompositorKind,
    signals: &EnvSignals,
    sender: FeedSender,
) -> Option<JoinHandle<()>> {
    match kind {
        CompositorKind::Hyprland => {
            let signature = signals.hyprland()?.to_string();
            Some(tokio::spawn(hyprland::ipc::run_feed(signature, sender)))
        }
        CompositorKind::Niri => {
            let socket = signals.niri()?.into();
            Some(tokio::spawn(niri::ipc::run_feed(socket, sender)))
        }
        CompositorKind::Unknown => None,
    }
}
