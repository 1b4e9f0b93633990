//! Cancellable byte pumps between a runtime socket and a client channel.
//!
//! A [`SessionBridge`] runs each [`Pump`] as its own task. Pumps never block
//! for longer than the bridge's read timeout, so every task re-checks the
//! shared [`CancelFlag`] at a bounded interval even when no data arrives.
//! The first pump to stop trips the flag; its siblings observe it at their
//! next step and wind down. Each pump closes the endpoint halves it owns in
//! [`Pump::finish`], which runs exactly once per pump.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use quickdocker_core::BridgeError;
use tokio::task::JoinHandle;

/// Default bound on one read before the cancel flag is checked again.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Cooperative cancellation shared by every direction of one bridge.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns true only for the call that actually set it.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one bounded pump step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Bytes moved to the destination.
    Forwarded(usize),
    /// A control message was applied instead of forwarded.
    Consumed,
    /// Nothing arrived within the read timeout.
    Idle,
    /// The source reached end of stream.
    Exhausted,
}

/// Why a pump stopped.
#[derive(Debug)]
pub enum PumpEnd {
    /// Its source was exhausted.
    Exhausted,
    /// The shared flag was set by a sibling or by the owner.
    Cancelled,
    /// An I/O error on either of its endpoints.
    Failed(BridgeError),
}

impl PumpEnd {
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for PumpEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => f.write_str("exhausted"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// One direction of a bridge.
#[async_trait]
pub trait Pump: Send {
    /// Direction name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Wait at most `wait` for the next unit from the source and forward it.
    async fn pump_once(&mut self, wait: Duration) -> Result<Flow, BridgeError>;

    /// Release the endpoint halves this pump owns.
    async fn finish(&mut self, end: &PumpEnd);
}

/// Summary of one direction after the bridge stopped.
#[derive(Debug)]
pub struct PumpReport {
    pub name: &'static str,
    pub end: PumpEnd,
    /// Bytes forwarded to the destination.
    pub bytes: u64,
    /// Frames or chunks forwarded.
    pub frames: u64,
    /// Control messages applied.
    pub controls: u64,
}

type ShutdownHook = Arc<dyn Fn() + Send + Sync>;

/// Drives a set of pumps until all of them stop.
pub struct SessionBridge {
    cancel: CancelFlag,
    read_timeout: Duration,
    on_shutdown: Option<ShutdownHook>,
}

impl SessionBridge {
    #[must_use]
    pub fn new(cancel: CancelFlag, read_timeout: Duration) -> Self {
        Self {
            cancel,
            read_timeout,
            on_shutdown: None,
        }
    }

    /// Run `hook` once, when the first direction stops.
    #[must_use]
    pub fn on_shutdown(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_shutdown = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub const fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Run every pump concurrently and wait for all of them to stop.
    ///
    /// Reports come back in the order the pumps were given. If the returned
    /// future is dropped early, the remaining pump tasks are aborted.
    pub async fn run(&self, pumps: Vec<Box<dyn Pump>>) -> Vec<PumpReport> {
        let mut group = TaskGroup::default();
        for pump in pumps {
            let name = pump.name();
            let handle = tokio::spawn(drive(
                pump,
                self.cancel.clone(),
                self.read_timeout,
                self.on_shutdown.clone(),
            ));
            group.push(name, handle);
        }
        group.join().await
    }
}

async fn drive(
    mut pump: Box<dyn Pump>,
    cancel: CancelFlag,
    wait: Duration,
    on_shutdown: Option<ShutdownHook>,
) -> PumpReport {
    let name = pump.name();
    let (mut bytes, mut frames, mut controls) = (0u64, 0u64, 0u64);

    let end = loop {
        if cancel.is_cancelled() {
            break PumpEnd::Cancelled;
        }
        match pump.pump_once(wait).await {
            Ok(Flow::Forwarded(n)) => {
                bytes += n as u64;
                frames += 1;
            }
            Ok(Flow::Consumed) => controls += 1,
            Ok(Flow::Idle) => {}
            Ok(Flow::Exhausted) => break PumpEnd::Exhausted,
            Err(e) => break PumpEnd::Failed(e),
        }
    };

    match &end {
        PumpEnd::Failed(e) => tracing::warn!(pump = name, error = %e, "Bridge direction failed"),
        other => tracing::debug!(pump = name, end = %other, "Bridge direction stopped"),
    }

    if cancel.cancel() {
        if let Some(hook) = on_shutdown {
            hook();
        }
    }
    pump.finish(&end).await;

    PumpReport {
        name,
        end,
        bytes,
        frames,
        controls,
    }
}

/// Owns the pump tasks of one bridge; aborts stragglers on drop.
#[derive(Default)]
struct TaskGroup {
    tasks: Vec<(&'static str, JoinHandle<PumpReport>)>,
}

impl TaskGroup {
    fn push(&mut self, name: &'static str, handle: JoinHandle<PumpReport>) {
        self.tasks.push((name, handle));
    }

    async fn join(mut self) -> Vec<PumpReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());
        for (name, handle) in &mut self.tasks {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(pump = *name, error = %e, "Bridge task panicked");
                    PumpReport {
                        name,
                        end: PumpEnd::Failed(BridgeError::client(format!("task failed: {e}"))),
                        bytes: 0,
                        frames: 0,
                        controls: 0,
                    }
                }
            };
            reports.push(report);
        }
        reports
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        for (_, handle) in &self.tasks {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
        time::Instant,
    };

    use super::*;

    const TICK: Duration = Duration::from_millis(20);

    /// Emits queued chunks, then either idles forever or exhausts.
    struct ScriptedPump {
        name: &'static str,
        chunks: VecDeque<Result<usize, BridgeError>>,
        exhaust_when_empty: bool,
        finished: Arc<AtomicUsize>,
    }

    impl ScriptedPump {
        fn boxed(
            name: &'static str,
            chunks: Vec<Result<usize, BridgeError>>,
            exhaust_when_empty: bool,
            finished: &Arc<AtomicUsize>,
        ) -> Box<dyn Pump> {
            Box::new(Self {
                name,
                chunks: chunks.into(),
                exhaust_when_empty,
                finished: Arc::clone(finished),
            })
        }
    }

    #[async_trait]
    impl Pump for ScriptedPump {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn pump_once(&mut self, wait: Duration) -> Result<Flow, BridgeError> {
            match self.chunks.pop_front() {
                Some(Ok(n)) => Ok(Flow::Forwarded(n)),
                Some(Err(e)) => Err(e),
                None if self.exhaust_when_empty => Ok(Flow::Exhausted),
                None => {
                    tokio::time::sleep(wait).await;
                    Ok(Flow::Idle)
                }
            }
        }

        async fn finish(&mut self, _end: &PumpEnd) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_exhaustion_cancels_sibling() {
        let finished = Arc::new(AtomicUsize::new(0));
        let hooks = Arc::new(AtomicUsize::new(0));
        let hook_count = Arc::clone(&hooks);

        let bridge = SessionBridge::new(CancelFlag::new(), TICK)
            .on_shutdown(move || {
                hook_count.fetch_add(1, Ordering::SeqCst);
            });

        let started = Instant::now();
        let reports = bridge
            .run(vec![
                ScriptedPump::boxed("out", vec![Ok(3), Ok(4)], true, &finished),
                ScriptedPump::boxed("in", Vec::new(), false, &finished),
            ])
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(reports[0].name, "out");
        assert!(matches!(reports[0].end, PumpEnd::Exhausted));
        assert_eq!(reports[0].bytes, 7);
        assert_eq!(reports[0].frames, 2);
        assert!(matches!(reports[1].end, PumpEnd::Cancelled));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
        assert_eq!(hooks.load(Ordering::SeqCst), 1);
        assert!(bridge.cancel_flag().is_cancelled());
    }

    #[tokio::test]
    async fn test_failure_is_reported_and_cancels() {
        let finished = Arc::new(AtomicUsize::new(0));
        let bridge = SessionBridge::new(CancelFlag::new(), TICK);

        let reports = bridge
            .run(vec![
                ScriptedPump::boxed("out", Vec::new(), false, &finished),
                ScriptedPump::boxed(
                    "in",
                    vec![Ok(1), Err(BridgeError::client("reset by peer"))],
                    false,
                    &finished,
                ),
            ])
            .await;

        assert!(matches!(reports[0].end, PumpEnd::Cancelled));
        assert!(reports[1].end.is_failure());
        assert_eq!(reports[1].bytes, 1);
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_external_cancel_stops_idle_pumps() {
        let finished = Arc::new(AtomicUsize::new(0));
        let cancel = CancelFlag::new();
        let bridge = SessionBridge::new(cancel.clone(), TICK);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel()
        });

        let reports = bridge
            .run(vec![
                ScriptedPump::boxed("out", Vec::new(), false, &finished),
                ScriptedPump::boxed("in", Vec::new(), false, &finished),
            ])
            .await;

        assert!(canceller.await.unwrap());
        assert!(reports.iter().all(|r| matches!(r.end, PumpEnd::Cancelled)));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_direction() {
        let finished = Arc::new(AtomicUsize::new(0));
        let bridge = SessionBridge::new(CancelFlag::new(), TICK);
        let reports = bridge
            .run(vec![ScriptedPump::boxed("tail", vec![Ok(2)], true, &finished)])
            .await;
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].end, PumpEnd::Exhausted));
    }

    #[test]
    fn test_cancel_flag_sets_once() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        assert!(flag.cancel());
        assert!(!flag.cancel());
        assert!(flag.clone().is_cancelled());
    }
}
