//! HTTP surface for the QuickDocker control plane.
//!
//! Provides:
//! - REST endpoints for containers, projects and lifecycle actions
//! - Interactive exec and state-watch WebSockets
//! - Server-sent log tails
//! - Static frontend mount

pub mod error;
pub mod http;
pub mod router;
pub mod sse;
pub mod state;
pub mod websocket;

pub use error::ApiError;
pub use router::create_router;
pub use state::AppState;
