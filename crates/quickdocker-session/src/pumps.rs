//! The two directions of an interactive exec session.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use quickdocker_core::{
    BridgeError, ByteStream, ClientSink, ClientStream, CloseCode, ControlMessage, Error,
    InboundFrame, OutboundFrame, SharedRuntime, TermSize, runtime::RemoteInput,
};
use tokio::{io::AsyncWriteExt, time::timeout};

use crate::{
    bridge::{Flow, Pump, PumpEnd},
    registry::SessionRecord,
};

/// Name of the process-output direction.
pub const OUTPUT_PUMP: &str = "remote_to_client";
/// Name of the client-input direction.
pub const INPUT_PUMP: &str = "client_to_remote";

/// Applies control messages received in-band.
#[async_trait]
pub trait ControlHandler: Send + Sync {
    /// Apply `msg`. An error ends the input direction.
    async fn apply(&self, msg: ControlMessage) -> Result<(), BridgeError>;
}

/// Forwards process output to the client as binary frames.
pub struct RemoteToClient {
    remote: ByteStream,
    client: ClientSink,
}

impl RemoteToClient {
    #[must_use]
    pub fn new(remote: ByteStream, client: ClientSink) -> Self {
        Self { remote, client }
    }
}

#[async_trait]
impl Pump for RemoteToClient {
    fn name(&self) -> &'static str {
        OUTPUT_PUMP
    }

    async fn pump_once(&mut self, wait: Duration) -> Result<Flow, BridgeError> {
        let Ok(next) = timeout(wait, self.remote.next()).await else {
            return Ok(Flow::Idle);
        };
        match next {
            None => Ok(Flow::Exhausted),
            Some(Err(e)) => Err(BridgeError::Remote(e)),
            Some(Ok(chunk)) if chunk.is_empty() => Ok(Flow::Idle),
            Some(Ok(chunk)) => {
                let n = chunk.len();
                self.client.send(OutboundFrame::Binary(chunk)).await?;
                Ok(Flow::Forwarded(n))
            }
        }
    }

    async fn finish(&mut self, end: &PumpEnd) {
        let (code, reason) = match end {
            PumpEnd::Exhausted => (CloseCode::Normal, "process exited"),
            PumpEnd::Cancelled => (CloseCode::Normal, "session closed"),
            PumpEnd::Failed(_) => (CloseCode::InternalError, "session failed"),
        };
        let close = OutboundFrame::Close {
            code,
            reason: reason.to_string(),
        };
        if let Err(e) = self.client.send(close).await {
            tracing::debug!(error = %e, "Client already gone, close frame dropped");
        }
        let _ = self.client.close().await;
    }
}

/// Forwards client input to the process, intercepting control messages.
pub struct ClientToRemote {
    client: ClientStream,
    remote: RemoteInput,
    control: Box<dyn ControlHandler>,
}

impl ClientToRemote {
    #[must_use]
    pub fn new(client: ClientStream, remote: RemoteInput, control: Box<dyn ControlHandler>) -> Self {
        Self {
            client,
            remote,
            control,
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<Flow, BridgeError> {
        self.remote.write_all(data).await?;
        self.remote.flush().await?;
        Ok(Flow::Forwarded(data.len()))
    }
}

#[async_trait]
impl Pump for ClientToRemote {
    fn name(&self) -> &'static str {
        INPUT_PUMP
    }

    async fn pump_once(&mut self, wait: Duration) -> Result<Flow, BridgeError> {
        let Ok(next) = timeout(wait, self.client.next()).await else {
            return Ok(Flow::Idle);
        };
        match next {
            None | Some(Ok(InboundFrame::Close)) => Ok(Flow::Exhausted),
            Some(Err(e)) => Err(e),
            Some(Ok(InboundFrame::Binary(data))) => self.write(&data).await,
            Some(Ok(InboundFrame::Text(text))) => match ControlMessage::parse(&text) {
                Some(msg) => {
                    self.control.apply(msg).await?;
                    Ok(Flow::Consumed)
                }
                None => self.write(text.as_bytes()).await,
            },
        }
    }

    async fn finish(&mut self, _end: &PumpEnd) {
        if let Err(e) = self.remote.shutdown().await {
            tracing::debug!(error = %e, "Remote input already closed");
        }
    }
}

/// Resizes the session's TTY on the runtime.
pub(crate) struct SessionControl {
    runtime: SharedRuntime,
    record: Arc<SessionRecord>,
}

impl SessionControl {
    pub(crate) fn new(runtime: SharedRuntime, record: Arc<SessionRecord>) -> Self {
        Self { runtime, record }
    }
}

#[async_trait]
impl ControlHandler for SessionControl {
    async fn apply(&self, msg: ControlMessage) -> Result<(), BridgeError> {
        let ControlMessage::Resize { cols, rows } = msg;
        match resize(&self.runtime, &self.record, TermSize::new(cols, rows)).await {
            Ok(()) => Ok(()),
            Err(Error::NotFound(what)) => Err(BridgeError::SessionGone(what)),
            Err(e) => {
                tracing::warn!(session_id = %self.record.id(), error = %e, "Resize failed");
                Ok(())
            }
        }
    }
}

/// Resize a session's TTY and record the new size.
pub(crate) async fn resize(
    runtime: &SharedRuntime,
    record: &SessionRecord,
    size: TermSize,
) -> quickdocker_core::Result<()> {
    let size = size.validate()?;
    runtime.resize_session(record.id(), size).await?;
    record.set_size(size);
    tracing::debug!(session_id = %record.id(), %size, "Session resized");
    Ok(())
}

