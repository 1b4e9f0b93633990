//! In-memory runtime used by tests across the workspace.
//!
//! `FakeRuntime` keeps containers, log histories with live appends and exec
//! processes whose remote end is handed to the test as a [`FakeProcess`].
//! Every socket or log stream it hands out holds a lease, so tests can check
//! that sessions release their resources with [`FakeRuntime::open_sockets`].

use std::{
    collections::{BTreeMap, HashMap},
    io,
    path::{Path, PathBuf},
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::{
    io::{AsyncReadExt, AsyncWrite, DuplexStream},
    sync::{broadcast, mpsc},
};
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};

use crate::{
    Error, Result,
    model::{ComposeAction, ContainerAction, ContainerInfo, HealthInfo, TermSize},
    runtime::{ByteStream, ComposeRunner, ExecAttachment, ExecSocket, RuntimeClient, TtyOptions},
};

/// Build a container record for tests.
#[must_use]
pub fn container(name: &str, project: &str, status: &str) -> ContainerInfo {
    ContainerInfo {
        id: name.to_string(),
        full_id: format!("{name}-full"),
        name: name.to_string(),
        image: "alpine:3".to_string(),
        status: status.to_string(),
        state: status.to_string(),
        ports: BTreeMap::new(),
        compose_project: project.to_string(),
        compose_service: String::new(),
        compose_workdir: if project.is_empty() {
            String::new()
        } else {
            format!("/srv/{project}")
        },
    }
}

struct Lease(Arc<AtomicUsize>);

impl Lease {
    fn acquire(counter: &Arc<AtomicUsize>) -> Arc<Self> {
        counter.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self(Arc::clone(counter)))
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct LeasedInput {
    inner: DuplexStream,
    _lease: Arc<Lease>,
}

impl AsyncWrite for LeasedInput {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

fn leased_stream<S>(stream: S, lease: Arc<Lease>) -> ByteStream
where
    S: futures::Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    stream
        .map(move |item| {
            let _held = &lease;
            item
        })
        .boxed()
}

#[derive(Default)]
struct FakeLog {
    /// History split into lines, terminators kept, so `tail` counts lines.
    lines: Vec<Bytes>,
    live: Option<broadcast::Sender<Bytes>>,
}

impl FakeLog {
    fn record(&mut self, chunk: &[u8]) {
        for piece in chunk.split_inclusive(|b| *b == b'\n') {
            match self.lines.last_mut() {
                Some(last) if !last.ends_with(b"\n") => {
                    *last = Bytes::from([last.as_ref(), piece].concat());
                }
                _ => self.lines.push(Bytes::copy_from_slice(piece)),
            }
        }
    }
}

struct ExecRecord {
    container_id: String,
    size: TermSize,
    resizes: usize,
}

#[derive(Default)]
struct State {
    containers: Vec<ContainerInfo>,
    logs: HashMap<String, FakeLog>,
    execs: HashMap<String, ExecRecord>,
    processes: HashMap<String, FakeProcess>,
    actions: Vec<(String, ContainerAction)>,
    unavailable: bool,
}

/// In-memory [`RuntimeClient`].
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
    sockets: Arc<AtomicUsize>,
    next_exec: AtomicU64,
}

impl FakeRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runtime holding the given containers.
    #[must_use]
    pub fn with_containers(containers: Vec<ContainerInfo>) -> Self {
        let runtime = Self::new();
        for c in containers {
            runtime.add_container(c);
        }
        runtime
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(state: &State) -> Result<()> {
        if state.unavailable {
            return Err(Error::RuntimeUnavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn find<'a>(state: &'a State, id: &str) -> Result<&'a ContainerInfo> {
        state
            .containers
            .iter()
            .find(|c| c.id == id || c.full_id == id || c.name == id)
            .ok_or_else(|| Error::not_found(format!("Container '{id}' not found")))
    }

    pub fn add_container(&self, container: ContainerInfo) {
        self.lock().containers.push(container);
    }

    /// Make every call fail with `RuntimeUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Append one log chunk, delivering it to live followers as is.
    pub fn append_log(&self, container_id: &str, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        let mut state = self.lock();
        let log = state.logs.entry(container_id.to_string()).or_default();
        log.record(&chunk);
        let live = log
            .live
            .get_or_insert_with(|| broadcast::channel(1024).0);
        let _ = live.send(chunk);
    }

    /// End every follower of this container's log.
    pub fn finish_logs(&self, container_id: &str) {
        if let Some(log) = self.lock().logs.get_mut(container_id) {
            log.live = None;
        }
    }

    /// Sockets and log streams handed out and not yet dropped.
    #[must_use]
    pub fn open_sockets(&self) -> usize {
        self.sockets.load(Ordering::SeqCst)
    }

    /// Take the remote end of an exec process.
    pub fn take_process(&self, exec_id: &str) -> Option<FakeProcess> {
        self.lock().processes.remove(exec_id)
    }

    /// Current TTY size of an exec.
    #[must_use]
    pub fn exec_size(&self, exec_id: &str) -> Option<TermSize> {
        self.lock().execs.get(exec_id).map(|e| e.size)
    }

    /// Number of resize calls received for an exec.
    #[must_use]
    pub fn resize_count(&self, exec_id: &str) -> usize {
        self.lock().execs.get(exec_id).map_or(0, |e| e.resizes)
    }

    /// Container an exec was created in.
    #[must_use]
    pub fn exec_container(&self, exec_id: &str) -> Option<String> {
        self.lock()
            .execs
            .get(exec_id)
            .map(|e| e.container_id.clone())
    }

    /// Forget an exec, as if the runtime had reaped it.
    pub fn drop_exec(&self, exec_id: &str) {
        self.lock().execs.remove(exec_id);
    }

    /// Lifecycle actions applied so far.
    #[must_use]
    pub fn actions(&self) -> Vec<(String, ContainerAction)> {
        self.lock().actions.clone()
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn health(&self) -> Result<HealthInfo> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(HealthInfo {
            ok: true,
            containers: i64::try_from(state.containers.len()).unwrap_or(i64::MAX),
            images: 1,
            server_version: "fake".to_string(),
        })
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(state.containers.clone())
    }

    async fn get_container(&self, id: &str) -> Result<ContainerInfo> {
        let state = self.lock();
        Self::check_available(&state)?;
        Self::find(&state, id).cloned()
    }

    async fn create_interactive_session(
        &self,
        container_id: &str,
        _command: &[String],
        tty: &TtyOptions,
    ) -> Result<ExecAttachment> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        let container = Self::find(&state, container_id)?;
        if !container.is_running() {
            return Err(Error::ActionFailed(format!(
                "Container {container_id} is not running"
            )));
        }

        let exec_id = format!("exec-{}", self.next_exec.fetch_add(1, Ordering::SeqCst) + 1);
        let lease = Lease::acquire(&self.sockets);
        let (output_tx, output_rx) = mpsc::channel(64);
        let (local, remote) = tokio::io::duplex(64 * 1024);

        state.execs.insert(
            exec_id.clone(),
            ExecRecord {
                container_id: container_id.to_string(),
                size: tty.size,
                resizes: 0,
            },
        );
        state.processes.insert(
            exec_id.clone(),
            FakeProcess {
                exec_id: exec_id.clone(),
                output: Some(output_tx),
                input: remote,
            },
        );

        Ok(ExecAttachment {
            exec_id,
            socket: ExecSocket {
                output: leased_stream(ReceiverStream::new(output_rx), Arc::clone(&lease)),
                input: Box::pin(LeasedInput {
                    inner: local,
                    _lease: lease,
                }),
            },
        })
    }

    async fn resize_session(&self, exec_id: &str, size: TermSize) -> Result<()> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        let exec = state
            .execs
            .get_mut(exec_id)
            .ok_or_else(|| Error::not_found(format!("Exec '{exec_id}' not found")))?;
        exec.size = size;
        exec.resizes += 1;
        Ok(())
    }

    async fn tail_logs(&self, container_id: &str, tail: usize) -> Result<ByteStream> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        Self::find(&state, container_id)?;

        let log = state.logs.entry(container_id.to_string()).or_default();
        let start = log.lines.len().saturating_sub(tail);
        let history: Vec<io::Result<Bytes>> = log.lines[start..].iter().cloned().map(Ok).collect();
        let live = log
            .live
            .get_or_insert_with(|| broadcast::channel(1024).0)
            .subscribe();

        let live = BroadcastStream::new(live).filter_map(|item| async move { item.ok().map(Ok) });
        let lease = Lease::acquire(&self.sockets);
        Ok(leased_stream(futures::stream::iter(history).chain(live), lease))
    }

    async fn container_action(&self, id: &str, action: ContainerAction) -> Result<()> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        let full_id = Self::find(&state, id)?.full_id.clone();
        state.actions.push((id.to_string(), action));
        match action {
            ContainerAction::Remove => state.containers.retain(|c| c.full_id != full_id),
            other => {
                let status = if other == ContainerAction::Stop {
                    "exited"
                } else {
                    "running"
                };
                for c in state.containers.iter_mut().filter(|c| c.full_id == full_id) {
                    c.status = status.to_string();
                    c.state = status.to_string();
                }
            }
        }
        Ok(())
    }
}

/// Remote end of an exec process created by [`FakeRuntime`].
pub struct FakeProcess {
    pub exec_id: String,
    output: Option<mpsc::Sender<io::Result<Bytes>>>,
    input: DuplexStream,
}

impl FakeProcess {
    /// Emit output from the process. Returns false once the reader is gone.
    pub async fn emit(&self, data: impl Into<Bytes>) -> bool {
        match &self.output {
            Some(tx) => tx.send(Ok(data.into())).await.is_ok(),
            None => false,
        }
    }

    /// Fail the output side with an I/O error.
    pub async fn fail(&self, kind: io::ErrorKind) -> bool {
        match &self.output {
            Some(tx) => tx.send(Err(io::Error::from(kind))).await.is_ok(),
            None => false,
        }
    }

    /// Exit the process: the output side reaches end of stream.
    pub fn exit(&mut self) {
        self.output = None;
    }

    /// Read whatever input arrives within `wait`.
    pub async fn read_input(&mut self, wait: Duration) -> Vec<u8> {
        let mut collected = Vec::new();
        let mut buf = [0u8; 4096];
        while let Ok(Ok(n)) = tokio::time::timeout(wait, self.input.read(&mut buf)).await {
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        collected
    }

    /// Read until end of input, i.e. until the session shuts its write half.
    pub async fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut collected = Vec::new();
        self.input.read_to_end(&mut collected).await?;
        Ok(collected)
    }
}

/// In-memory [`ComposeRunner`] that records invocations.
#[derive(Default)]
pub struct FakeCompose {
    calls: Mutex<Vec<(PathBuf, ComposeAction)>>,
    failure: Mutex<Option<String>>,
}

impl FakeCompose {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent runs fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<(PathBuf, ComposeAction)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ComposeRunner for FakeCompose {
    async fn run(&self, workdir: &Path, action: ComposeAction) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((workdir.to_path_buf(), action));
        if let Some(message) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(Error::ActionFailed(message));
        }
        Ok(format!("compose {action} done"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_tail_then_live() {
        let runtime = FakeRuntime::with_containers(vec![container("web-1", "", "running")]);
        for line in ["a\n", "b\n", "c\n"] {
            runtime.append_log("web-1", line);
        }

        let mut stream = runtime.tail_logs("web-1", 2).await.unwrap();
        assert_eq!(runtime.open_sockets(), 1);
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from("b\n"));
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from("c\n"));

        runtime.append_log("web-1", "d\n");
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from("d\n"));

        runtime.finish_logs("web-1");
        assert!(stream.next().await.is_none());
        drop(stream);
        assert_eq!(runtime.open_sockets(), 0);
    }

    #[tokio::test]
    async fn test_log_tail_counts_lines_across_chunks() {
        let runtime = FakeRuntime::with_containers(vec![container("web-1", "", "running")]);
        runtime.append_log("web-1", "a\nb\nc");
        runtime.append_log("web-1", "d\ne\n");

        let stream = runtime.tail_logs("web-1", 2).await.unwrap();
        runtime.finish_logs("web-1");
        let replayed: Vec<Bytes> = stream.map(Result::unwrap).collect().await;
        assert_eq!(replayed, vec![Bytes::from("cd\n"), Bytes::from("e\n")]);
    }

    #[tokio::test]
    async fn test_exec_socket_lease() {
        let runtime = FakeRuntime::with_containers(vec![container("web-1", "", "running")]);
        let attachment = runtime
            .create_interactive_session("web-1", &[], &TtyOptions::new(TermSize::default()))
            .await
            .unwrap();
        assert_eq!(runtime.open_sockets(), 1);

        let ExecSocket { output, input } = attachment.socket;
        drop(output);
        assert_eq!(runtime.open_sockets(), 1);
        drop(input);
        assert_eq!(runtime.open_sockets(), 0);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let runtime = FakeRuntime::new();
        runtime.set_unavailable(true);
        let err = runtime.list_containers().await.unwrap_err();
        assert!(matches!(err, Error::RuntimeUnavailable(_)));
    }
}
