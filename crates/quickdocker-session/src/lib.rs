//! Session layer for the QuickDocker control plane.
//!
//! - [`SessionBridge`] - Cancellable bidirectional byte pumps
//! - [`ExecSessionManager`] - Interactive exec sessions with in-band resize
//! - [`LogStreamer`] - Lazy line-oriented log tails
//! - [`EventBroadcaster`] - Periodic project snapshots
//! - [`Inventory`] - Container queries and lifecycle dispatch

pub mod bridge;
pub mod config;
pub mod events;
pub mod inventory;
pub mod logs;
pub mod manager;
pub mod pumps;
pub mod registry;

pub use bridge::{CancelFlag, Flow, Pump, PumpEnd, PumpReport, SessionBridge};
pub use config::{BroadcastConfig, ExecConfig};
pub use events::{EventBroadcaster, StateWatch};
pub use inventory::Inventory;
pub use logs::{DEFAULT_TAIL, LogCursor, LogLines, LogStreamer};
pub use manager::{ExecSessionManager, SessionHandle, SessionReport};
pub use registry::{SessionId, SessionInfo, SessionState};
