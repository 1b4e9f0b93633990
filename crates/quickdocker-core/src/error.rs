//! Error taxonomy shared by every layer.

use thiserror::Error;

/// Control-plane error.
#[derive(Debug, Error)]
pub enum Error {
    /// Container, project or session id is unknown.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The container runtime cannot be reached.
    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    /// Request rejected before touching the runtime.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// The runtime was reached but refused or failed the operation.
    #[error("Action failed: {0}")]
    ActionFailed(String),
    /// Socket or channel failure in the middle of a session.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Shorthand for [`Error::InvalidRequest`].
    pub fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidRequest(what.into())
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// I/O failure on one side of a running bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Remote socket error: {0}")]
    Remote(#[from] std::io::Error),
    #[error("Client channel error: {0}")]
    Client(String),
    #[error("Session gone: {0}")]
    SessionGone(String),
}

impl BridgeError {
    /// Wrap any displayable client-side failure.
    pub fn client(err: impl std::fmt::Display) -> Self {
        Self::Client(err.to_string())
    }
}

/// Result alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
