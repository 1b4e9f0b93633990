//! Shared handler state.

use std::sync::Arc;

use quickdocker_core::{SharedCompose, SharedRuntime};
use quickdocker_session::{
    BroadcastConfig, EventBroadcaster, ExecConfig, ExecSessionManager, Inventory, LogStreamer,
};

/// Components behind every route. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub inventory: Arc<Inventory>,
    pub exec: Arc<ExecSessionManager>,
    pub logs: Arc<LogStreamer>,
    pub events: Arc<EventBroadcaster>,
}

impl AppState {
    /// Wire every component to one runtime handle.
    #[must_use]
    pub fn new(
        runtime: SharedRuntime,
        compose: SharedCompose,
        exec: ExecConfig,
        broadcast: BroadcastConfig,
    ) -> Self {
        Self {
            inventory: Arc::new(Inventory::new(Arc::clone(&runtime), compose)),
            exec: Arc::new(ExecSessionManager::new(Arc::clone(&runtime), exec)),
            logs: Arc::new(LogStreamer::new(Arc::clone(&runtime))),
            events: Arc::new(EventBroadcaster::new(runtime, broadcast)),
        }
    }
}
