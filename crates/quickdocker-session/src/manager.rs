//! Interactive exec sessions bridged to client channels.

use std::sync::Arc;

use quickdocker_core::{
    ClientSink, ClientStream, Error, ExecSocket, Result, SharedRuntime, TermSize, TtyOptions,
};

use crate::{
    bridge::{Pump, PumpReport, SessionBridge},
    config::ExecConfig,
    pumps::{self, ClientToRemote, INPUT_PUMP, OUTPUT_PUMP, RemoteToClient, SessionControl},
    registry::{Registration, SessionId, SessionInfo, SessionRecord, SessionRegistry, SessionState},
};

/// An opened session, ready to be bridged to a client.
///
/// Dropping the handle without running it closes the runtime socket and
/// deregisters the session.
pub struct SessionHandle {
    record: Arc<SessionRecord>,
    socket: ExecSocket,
    registration: Registration,
}

impl SessionHandle {
    #[must_use]
    pub fn id(&self) -> &str {
        self.record.id()
    }

    #[must_use]
    pub fn container_id(&self) -> &str {
        self.record.container_id()
    }

    #[must_use]
    pub fn size(&self) -> TermSize {
        self.record.size()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub container_id: String,
    pub pumps: Vec<PumpReport>,
}

impl SessionReport {
    #[must_use]
    pub fn pump(&self, name: &str) -> Option<&PumpReport> {
        self.pumps.iter().find(|p| p.name == name)
    }

    /// Process output bytes delivered to the client.
    #[must_use]
    pub fn output_bytes(&self) -> u64 {
        self.pump(OUTPUT_PUMP).map_or(0, |p| p.bytes)
    }

    /// Client input bytes delivered to the process.
    #[must_use]
    pub fn input_bytes(&self) -> u64 {
        self.pump(INPUT_PUMP).map_or(0, |p| p.bytes)
    }

    /// Control messages consumed from the client.
    #[must_use]
    pub fn controls(&self) -> u64 {
        self.pump(INPUT_PUMP).map_or(0, |p| p.controls)
    }
}

/// Opens, resizes, bridges and closes interactive exec sessions.
pub struct ExecSessionManager {
    runtime: SharedRuntime,
    config: ExecConfig,
    registry: Arc<SessionRegistry>,
}

impl ExecSessionManager {
    #[must_use]
    pub fn new(runtime: SharedRuntime, config: ExecConfig) -> Self {
        Self {
            runtime,
            config,
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    /// Start a TTY-attached shell in `container_id`.
    ///
    /// The session is registered only once the runtime socket exists, so a
    /// failed open leaves nothing behind.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRequest`] for a zero-sized terminal,
    /// [`Error::NotFound`] for an unknown container and
    /// [`Error::RuntimeUnavailable`] when the runtime cannot be reached.
    pub async fn open(&self, container_id: &str, size: TermSize) -> Result<SessionHandle> {
        let size = size.validate()?;
        let tty = TtyOptions {
            size,
            term: self.config.term.clone(),
        };
        let attachment = self
            .runtime
            .create_interactive_session(container_id, &self.config.command, &tty)
            .await?;

        let record = Arc::new(SessionRecord::new(attachment.exec_id, container_id, size));
        record.advance(SessionState::Attached);
        let registration = Registration::new(Arc::clone(&self.registry), Arc::clone(&record));

        tracing::info!(
            session_id = %record.id(),
            container_id,
            %size,
            "Exec session opened"
        );

        Ok(SessionHandle {
            record,
            socket: attachment.socket,
            registration,
        })
    }

    /// Resize a live session.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown or closed session.
    pub async fn resize(&self, session_id: &str, size: TermSize) -> Result<()> {
        let record = self
            .registry
            .get(session_id)
            .ok_or_else(|| Error::not_found(format!("Session '{session_id}' not found")))?;
        pumps::resize(&self.runtime, &record, size).await
    }

    /// Bridge a session to a client channel until either side ends.
    ///
    /// Output flows to `client_tx` as binary frames and a final close frame.
    /// Input from `client_rx` reaches the process, except resize envelopes,
    /// which are applied instead. When this returns, the runtime socket and
    /// both client halves are closed and the session is deregistered.
    pub async fn run(
        &self,
        handle: SessionHandle,
        client_tx: ClientSink,
        client_rx: ClientStream,
    ) -> SessionReport {
        let SessionHandle {
            record,
            socket,
            registration,
        } = handle;
        let ExecSocket { output, input } = socket;

        let control = SessionControl::new(Arc::clone(&self.runtime), Arc::clone(&record));
        let pumps: Vec<Box<dyn Pump>> = vec![
            Box::new(RemoteToClient::new(output, client_tx)),
            Box::new(ClientToRemote::new(client_rx, input, Box::new(control))),
        ];

        let closing = Arc::clone(&record);
        let bridge = SessionBridge::new(record.cancel_flag().clone(), self.config.read_timeout)
            .on_shutdown(move || {
                closing.advance(SessionState::Closing);
            });

        record.advance(SessionState::Streaming);
        let reports = bridge.run(pumps).await;
        drop(registration);

        let report = SessionReport {
            session_id: record.id().to_string(),
            container_id: record.container_id().to_string(),
            pumps: reports,
        };
        tracing::info!(
            session_id = %report.session_id,
            container_id = %report.container_id,
            output_bytes = report.output_bytes(),
            input_bytes = report.input_bytes(),
            "Exec session closed"
        );
        report
    }

    /// Ask a running session to stop. Repeated calls while it winds down
    /// are no-ops.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] once the session is gone.
    pub fn close(&self, session_id: &str) -> Result<()> {
        let record = self
            .registry
            .get(session_id)
            .ok_or_else(|| Error::not_found(format!("Session '{session_id}' not found")))?;
        record.advance(SessionState::Closing);
        if record.cancel_flag().cancel() {
            tracing::info!(session_id, "Exec session close requested");
        }
        Ok(())
    }

    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<SessionInfo> {
        self.registry.get(session_id).map(|r| r.info())
    }

    #[must_use]
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.list()
    }

    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }
}
