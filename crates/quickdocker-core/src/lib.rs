//! Core abstractions for the QuickDocker control plane.
//!
//! This crate provides the fundamental building blocks:
//! - `Error` / `BridgeError` - Error taxonomy shared by all layers
//! - `ContainerInfo`, `Project` and action types
//! - `RuntimeClient` and `ComposeRunner` collaborator traits
//! - Client frames and the in-band `ControlMessage` envelope
//! - `FakeRuntime` for tests (feature: testing)

pub mod error;
pub mod model;
pub mod projects;
pub mod protocol;
pub mod runtime;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{BridgeError, Error, Result};
pub use model::{
    ComposeAction, ContainerAction, ContainerInfo, HealthInfo, Project, ProjectStatus, TermSize,
};
pub use protocol::{
    ClientSink, ClientStream, CloseCode, ControlMessage, InboundFrame, OutboundFrame, ServerEvent,
};
pub use runtime::{
    ByteStream, ComposeRunner, ExecAttachment, ExecSocket, RuntimeClient, SharedCompose,
    SharedRuntime, TtyOptions,
};
