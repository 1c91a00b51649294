//! Daemon connection for the CLI client.
//!
//! Connects to the daemon socket, performs the handshake, and offers one
//! method per request. Pushed events that arrive while waiting for a
//! response are skipped.

use std::path::Path;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

use crate::context::ContextSnapshot;
use crate::ipc::codec::LengthPrefixedCodec;
use crate::ipc::protocol::{CompositorStatus, Message, PROTOCOL_VERSION, Status};

use super::ClientError;

pub struct DaemonClient {
    framed: Framed<UnixStream, LengthPrefixedCodec>,
    next_id: u32,
}

impl DaemonClient {
    /// Connect to the daemon at `socket_path` and perform the handshake.
    pub async fn connect(socket_path: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path).await.map_err(|e| {
            ClientError::Daemon(format!("connect to {} failed: {e}", socket_path.display()))
        })?;
        let mut framed = Framed::new(stream, LengthPrefixedCodec::new());

        framed
            .send(Message::Hello {
                id: 0,
                version: PROTOCOL_VERSION,
            })
            .await?;

        match framed.next().await.transpose()? {
            Some(Message::HelloAck {
                status: Status::Ok, ..
            }) => {}
            Some(Message::HelloAck { version, error, .. }) => {
                return Err(ClientError::Daemon(format!(
                    "handshake rejected: {} (daemon protocol {version}, client {PROTOCOL_VERSION})",
                    error.unwrap_or_default()
                )));
            }
            other => {
                return Err(ClientError::Daemon(format!(
                    "unexpected handshake response: {other:?}"
                )));
            }
        }

        Ok(Self {
            framed,
            next_id: 1, // 0 = hello
        })
    }

    pub async fn get_context(&mut self) -> Result<ContextSnapshot, ClientError> {
        let id = self.allocate_id();
        match self.request(Message::GetContext { id }).await? {
            Message::Response {
                context: Some(context),
                ..
            } => Ok(context),
            other => Err(unexpected("get_context", other)),
        }
    }

    pub async fn record_launch(&mut self, app_id: &str) -> Result<(), ClientError> {
        let id = self.allocate_id();
        self.request(Message::RecordLaunch {
            id,
            app_id: app_id.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn get_status(&mut self) -> Result<CompositorStatus, ClientError> {
        let id = self.allocate_id();
        match self.request(Message::GetStatus { id }).await? {
            Message::Response {
                compositor: Some(status),
                ..
            } => Ok(status),
            other => Err(unexpected("get_status", other)),
        }
    }

    pub async fn subscribe(&mut self) -> Result<(), ClientError> {
        let id = self.allocate_id();
        self.request(Message::Subscribe { id }).await?;
        Ok(())
    }

    /// Next pushed `(name, data)` event. `None` once the daemon hangs up.
    pub async fn next_event(&mut self) -> Result<Option<(String, String)>, ClientError> {
        while let Some(msg) = self.framed.next().await.transpose()? {
            if let Message::Event { name, data, .. } = msg {
                return Ok(Some((name, data)));
            }
            tracing::debug!(?msg, "ignoring non-event message");
        }
        Ok(None)
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    /// Send a request and wait for the response with the same id.
    ///
    /// An error status is turned into [`ClientError::Daemon`].
    async fn request(&mut self, msg: Message) -> Result<Message, ClientError> {
        let id = request_id(&msg);
        self.framed.send(msg).await?;

        loop {
            let Some(reply) = self.framed.next().await.transpose()? else {
                return Err(ClientError::Daemon("connection closed".into()));
            };
            match reply {
                Message::Event { .. } => continue,
                Message::Response {
                    id: reply_id,
                    status: Status::Error,
                    error,
                    ..
                } if reply_id == id => {
                    return Err(ClientError::Daemon(error.unwrap_or_default()));
                }
                Message::Response { id: reply_id, .. } if reply_id == id => return Ok(reply),
                other => return Err(unexpected("request", other)),
            }
        }
    }
}

fn request_id(msg: &Message) -> u32 {
    match msg {
        Message::Hello { id, .. }
        | Message::HelloAck { id, .. }
        | Message::GetContext { id }
        | Message::RecordLaunch { id, .. }
        | Message::GetStatus { id }
        | Message::Subscribe { id }
        | Message::Unsubscribe { id }
        | Message::Event { id, .. }
        | Message::Response { id, .. } => *id,
    }
}

fn unexpected(op: &str, msg: Message) -> ClientError {
    ClientError::Daemon(format!("unexpected {op} response: {msg:?}"))
}
