//! Error types for change-feed streaming.

use thiserror::Error;

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur on a change-feed session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The websocket transport is closed or a write timed out.
    #[error("websocket closed")]
    WebsocketClosed,

    /// The subscriber fell behind and its feed buffer overflowed.
    #[error("stream lost: change feed buffer overflowed")]
    StreamLost,

    /// A second `start` was issued on a single-use session or streamer.
    #[error("already started")]
    AlreadyStarted,

    /// The client violated the control protocol.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the violation.
        message: String,
    },
}

impl StreamError {
    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns the stable wire kind for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WebsocketClosed => "websocket-closed",
            Self::StreamLost => "stream-lost",
            Self::AlreadyStarted => "already-started",
            Self::Protocol { .. } => "bad-request",
        }
    }
}
