//! Context daemon: compositor tracking behind a local socket.
//!
//! Architecture: channel-based actor. A single daemon loop owns all
//! mutable state ([`state::DaemonState`]): the detector, the active
//! backend, the context tracker and the event bus. Per-connection tasks
//! forward requests via mpsc channels and receive pushed events on their
//! own channel. Compositor feed tasks send [`BackendUpdate`]s tagged with
//! a generation so a replaced feed cannot overwrite fresh state.

mod connection;
mod handler;
pub mod state;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use connection::{DaemonCommand, DisconnectNotice};
use state::{ConnectionId, DaemonState, SessionProbe};

use crate::compositor::BackendUpdate;
use crate::context::{SystemClock, TrackerConfig};

/// Daemon startup/runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("$XDG_RUNTIME_DIR is not set")]
    NoRuntimeDir,
    #[error("daemon already running at {0}")]
    AlreadyRunning(PathBuf),
    #[error("failed to create directory {path}: {source}")]
    MkdirFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to bind socket {path}: {source}")]
    BindFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonConfig {
    pub tracker: TrackerConfig,
    pub probe: SessionProbe,
    /// Grace delay before the single re-detection pass.
    pub redetect_delay: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            probe: SessionProbe::default(),
            redetect_delay: Duration::from_millis(2000),
        }
    }
}

/// Run the daemon until SIGTERM or SIGINT.
///
/// Socket at `$XDG_RUNTIME_DIR/shellctx/daemon.sock` (directory mode
/// 0700); a stale socket is replaced, a live one is an error. The socket
/// file is removed on shutdown. Nothing is persisted.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    let socket_path = resolve_socket_path()?;
    let listener = bind_socket(&socket_path).await?;

    tracing::info!(path = %socket_path.display(), "daemon listening");

    let (backend_tx, backend_rx) = mpsc::unbounded_channel();
    let mut state = DaemonState::new(config.tracker, config.probe, SystemClock, backend_tx);
    state.detect();

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        }
    };

    serve(
        &listener,
        state,
        backend_rx,
        Some(config.redetect_delay),
        shutdown,
    )
    .await;

    drop(listener);
    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::warn!(error = %e, path = %socket_path.display(), "failed to remove socket");
    }

    tracing::info!("daemon stopped");
    Ok(())
}

/// The daemon loop. Returns once `shutdown` completes.
async fn serve<C, F>(
    listener: &UnixListener,
    mut state: DaemonState<C>,
    mut backend_rx: mpsc::UnboundedReceiver<BackendUpdate>,
    redetect_delay: Option<Duration>,
    shutdown: F,
) where
    C: crate::context::Clock,
    F: Future<Output = ()>,
{
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<DaemonCommand>();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel::<DisconnectNotice>();

    let redetect = tokio::time::sleep(redetect_delay.unwrap_or_default());
    tokio::pin!(redetect);
    let mut redetect_pending = redetect_delay.is_some();

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // -- New connection --
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        accept_connection(stream, &mut state, &cmd_tx, &disconnect_tx);
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                }
            }

            // -- Request from connection task --
            Some(cmd) = cmd_rx.recv() => {
                let response = handler::handle_message(&mut state, cmd.request, cmd.connection_id);
                let _ = cmd.response_tx.send(response);
            }

            // -- Connection disconnected --
            Some(notice) = disconnect_rx.recv() => {
                state.remove_connection(notice.connection_id);
                tracing::debug!(conn_id = ?notice.connection_id, "connection cleaned up");
            }

            // -- Compositor feed --
            Some(update) = backend_rx.recv() => {
                state.apply_update(update);
            }

            // -- Late environment signals --
            () = &mut redetect, if redetect_pending => {
                redetect_pending = false;
                let detection = state.detect();
                if detection.changed {
                    tracing::info!(compositor = detection.label, "compositor changed on re-detect");
                }
            }

            () = &mut shutdown => break,
        }
    }
}

fn accept_connection<C: crate::context::Clock>(
    stream: UnixStream,
    state: &mut DaemonState<C>,
    cmd_tx: &mpsc::UnboundedSender<DaemonCommand>,
    disconnect_tx: &mpsc::UnboundedSender<DisconnectNotice>,
) {
    let conn_id = ConnectionId::new();
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    state.add_connection(conn_id, push_tx);

    connection::spawn_connection(
        stream,
        conn_id,
        cmd_tx.clone(),
        push_rx,
        disconnect_tx.clone(),
    );

    tracing::debug!(?conn_id, "accepted connection");
}

// -- Socket setup --

/// Resolve the daemon socket path from `$XDG_RUNTIME_DIR`.
pub fn resolve_socket_path() -> Result<PathBuf, DaemonError> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .ok()
        .filter(|dir| !dir.is_empty())
        .ok_or(DaemonError::NoRuntimeDir)?;
    Ok(PathBuf::from(runtime_dir)
        .join("shellctx")
        .join("daemon.sock"))
}

/// Create the socket directory and bind the Unix listener.
///
/// On EADDRINUSE, probes the existing socket: a successful connect means
/// another daemon is running, otherwise the socket is stale and replaced.
async fn bind_socket(path: &Path) -> Result<UnixListener, DaemonError> {
    let parent = path.parent().ok_or_else(|| DaemonError::BindFailed {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "socket path has no parent"),
    })?;
    let mkdir_failed = |source| DaemonError::MkdirFailed {
        path: parent.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(parent).map_err(mkdir_failed)?;
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))
            .map_err(mkdir_failed)?;
    }

    let bind_failed = |source| DaemonError::BindFailed {
        path: path.to_path_buf(),
        source,
    };
    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            if UnixStream::connect(path).await.is_ok() {
                return Err(DaemonError::AlreadyRunning(path.to_path_buf()));
            }
            tracing::info!(path = %path.display(), "removing stale socket");
            std::fs::remove_file(path).map_err(bind_failed)?;
            UnixListener::bind(path).map_err(bind_failed)
        }
        Err(e) => Err(bind_failed(e)),
    }
}
