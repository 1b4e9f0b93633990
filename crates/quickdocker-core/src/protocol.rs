//! Client-facing frames and in-band control messages.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Sink, stream::BoxStream};
use serde::{Deserialize, Serialize};

use crate::{BridgeError, Error, model::Project};

/// Frame received from an interactive client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Raw terminal input.
    Binary(Bytes),
    /// Control envelope, or literal input if it does not decode as one.
    Text(String),
    /// Client closed the channel.
    Close,
}

/// Frame sent to an interactive client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Raw terminal output, unmodified.
    Binary(Bytes),
    /// Close the channel with a code and reason.
    Close { code: CloseCode, reason: String },
}

/// Write half of a client channel.
pub type ClientSink = Pin<Box<dyn Sink<OutboundFrame, Error = BridgeError> + Send>>;

/// Read half of a client channel.
pub type ClientStream = BoxStream<'static, Result<InboundFrame, BridgeError>>;

/// Close codes used on streaming channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Session ended normally.
    Normal,
    /// Target container unknown or request rejected.
    NotFound,
    /// Failure in the middle of a session.
    InternalError,
    /// Container runtime unreachable.
    Unavailable,
}

impl CloseCode {
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::NotFound => 1008,
            Self::InternalError => 1011,
            Self::Unavailable => 1013,
        }
    }

    /// Close code for a failed session open.
    #[must_use]
    pub const fn for_error(err: &Error) -> Self {
        match err {
            Error::NotFound(_) | Error::InvalidRequest(_) => Self::NotFound,
            Error::RuntimeUnavailable(_) => Self::Unavailable,
            Error::ActionFailed(_) | Error::Bridge(_) => Self::InternalError,
        }
    }
}

/// In-band control message carried as a text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Resize the terminal.
    Resize { cols: u16, rows: u16 },
}

impl ControlMessage {
    /// Decode a text payload.
    ///
    /// Anything that is not a well-formed, recognized envelope yields `None`
    /// and must be treated as literal input.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Message pushed to state-watching clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full project snapshot.
    State { projects: Vec<Project> },
}
