//! CLI client for daemon queries.
//!
//! One-shot commands connect to the daemon, perform a single request,
//! print the result, and exit. `watch` stays connected and prints pushed
//! compositor events until the daemon goes away or Ctrl-C.

mod daemon_client;
mod format;

use crate::cli::ClientAction;
use crate::daemon::{self, DaemonError};
use crate::ipc::codec::CodecError;
use daemon_client::DaemonClient;

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("daemon: {0}")]
    Daemon(String),
    #[error(transparent)]
    Socket(#[from] DaemonError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the client command. Called from `main.rs` for `Command::Client`.
pub async fn run(action: ClientAction) -> Result<(), ClientError> {
    let socket_path = daemon::resolve_socket_path()?;
    let mut client = DaemonClient::connect(&socket_path).await?;

    match action {
        ClientAction::Context { json } => {
            let context = client.get_context().await?;
            format::print_context(&context, json)?;
        }
        ClientAction::Launch { app_id } => {
            client.record_launch(&app_id).await?;
            println!("Recorded launch of {app_id}");
        }
        ClientAction::Status { json } => {
            let status = client.get_status().await?;
            format::print_status(&status, json)?;
        }
        ClientAction::Watch => {
            client.subscribe().await?;
            loop {
                tokio::select! {
                    event = client.next_event() => match event? {
                        Some((name, data)) => format::print_event(&name, &data),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    Ok(())
}
