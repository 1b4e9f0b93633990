//! Periodic full-state snapshots for watching clients.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{StreamExt, future, stream::BoxStream};
use quickdocker_core::{Result, RuntimeClient, ServerEvent, SharedRuntime, projects::group_projects};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;

use crate::config::BroadcastConfig;

/// Stream of state events for one watcher.
pub type StateWatch = BoxStream<'static, ServerEvent>;

/// Produces project snapshots on a fixed interval.
///
/// Every watcher gets its own timer; there is no shared fan-out, so a slow
/// watcher only delays itself.
pub struct EventBroadcaster {
    runtime: SharedRuntime,
    interval: Duration,
    watchers: Arc<AtomicUsize>,
}

impl EventBroadcaster {
    #[must_use]
    pub fn new(runtime: SharedRuntime, config: BroadcastConfig) -> Self {
        Self {
            runtime,
            interval: config.interval,
            watchers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Current grouped state.
    ///
    /// # Errors
    /// Returns an error when the runtime cannot list containers.
    pub async fn snapshot(&self) -> Result<ServerEvent> {
        snapshot(self.runtime.as_ref()).await
    }

    /// Snapshots now and then every interval until the stream is dropped.
    ///
    /// A tick whose snapshot fails is skipped; the next tick tries again.
    #[must_use]
    pub fn watch(&self) -> StateWatch {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let runtime = Arc::clone(&self.runtime);
        let guard = WatcherGuard::enter(&self.watchers);

        IntervalStream::new(ticker)
            .then(move |_| {
                let runtime = Arc::clone(&runtime);
                async move { snapshot(runtime.as_ref()).await }
            })
            .filter_map(move |result| {
                let _watching = &guard;
                future::ready(match result {
                    Ok(event) => Some(event),
                    Err(e) => {
                        tracing::warn!(error = %e, "State snapshot failed, skipping tick");
                        None
                    }
                })
            })
            .boxed()
    }

    /// Watch streams currently alive.
    #[must_use]
    pub fn watchers(&self) -> usize {
        self.watchers.load(Ordering::SeqCst)
    }
}

async fn snapshot(runtime: &dyn RuntimeClient) -> Result<ServerEvent> {
    let containers = runtime.list_containers().await?;
    Ok(ServerEvent::State {
        projects: group_projects(containers),
    })
}

struct WatcherGuard(Arc<AtomicUsize>);

impl WatcherGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(watchers = n, "State watcher attached");
        Self(Arc::clone(counter))
    }
}

impl Drop for WatcherGuard {
    fn drop(&mut self) {
        let n = self.0.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::debug!(watchers = n, "State watcher detached");
    }
}

#[cfg(test)]
mod tests {
    use quickdocker_core::{
        ProjectStatus,
        testing::{FakeRuntime, container},
    };

    use super::*;

    fn projects(event: ServerEvent) -> Vec<(String, ProjectStatus)> {
        let ServerEvent::State { projects } = event;
        projects.into_iter().map(|p| (p.name, p.status)).collect()
    }

    fn broadcaster(fake: &Arc<FakeRuntime>, interval: Duration) -> EventBroadcaster {
        EventBroadcaster::new(fake.clone(), BroadcastConfig { interval })
    }

    #[tokio::test]
    async fn test_snapshot_groups_projects() {
        let fake = Arc::new(FakeRuntime::with_containers(vec![
            container("web-1", "shop", "running"),
            container("db-1", "shop", "exited"),
            container("tool", "", "running"),
        ]));
        let events = broadcaster(&fake, Duration::from_secs(2));
        let snapshot = projects(events.snapshot().await.unwrap());
        assert_eq!(
            snapshot,
            vec![
                ("shop".to_string(), ProjectStatus::Partial),
                ("_standalone".to_string(), ProjectStatus::Running),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_ticks_and_reflects_changes() {
        let fake = Arc::new(FakeRuntime::with_containers(vec![container(
            "web-1", "shop", "running",
        )]));
        let events = broadcaster(&fake, Duration::from_secs(2));
        let mut watch = events.watch();

        let first = projects(watch.next().await.unwrap());
        assert_eq!(first, vec![("shop".to_string(), ProjectStatus::Running)]);

        fake.add_container(container("db-1", "shop", "exited"));
        let second = projects(watch.next().await.unwrap());
        assert_eq!(second, vec![("shop".to_string(), ProjectStatus::Partial)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_is_skipped() {
        let fake = Arc::new(FakeRuntime::with_containers(vec![container(
            "web-1", "shop", "running",
        )]));
        let events = broadcaster(&fake, Duration::from_millis(100));
        fake.set_unavailable(true);
        let mut watch = events.watch();

        let recover = {
            let fake = Arc::clone(&fake);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                fake.set_unavailable(false);
            })
        };

        let event = watch.next().await.unwrap();
        assert_eq!(projects(event).len(), 1);
        recover.await.unwrap();
    }

    #[tokio::test]
    async fn test_watcher_count() {
        let fake = Arc::new(FakeRuntime::new());
        let events = broadcaster(&fake, Duration::from_secs(2));
        let a = events.watch();
        let b = events.watch();
        assert_eq!(events.watchers(), 2);
        drop(a);
        assert_eq!(events.watchers(), 1);
        drop(b);
        assert_eq!(events.watchers(), 0);
    }
}
