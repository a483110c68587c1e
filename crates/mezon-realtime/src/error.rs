//! Error type shared by every realtime component.

use std::time::Duration;

use crate::envelope::EnvelopeError;

/// Errors surfaced by the realtime engine.
///
/// Cloneable so one failure (for example a lost connection) can be delivered
/// to every outstanding request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RealtimeError {
    /// The WebSocket handshake did not complete within the connect timeout.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    /// The transport failed (DNS, TCP, TLS, upgrade or write error).
    #[error("transport error: {0}")]
    Transport(String),
    /// A send was attempted while the connection is not open.
    #[error("not connected")]
    NotConnected,
    /// No response arrived for a correlated request within its timeout.
    #[error("request {cid} timed out after {timeout:?}")]
    RequestTimeout {
        /// Correlation id of the request.
        cid: u64,
        /// The timeout that elapsed.
        timeout: Duration,
    },
    /// The connection dropped while the request was outstanding.
    #[error("connection lost")]
    ConnectionLost,
    /// A frame could not be decoded.
    #[error("protocol decode error: {0}")]
    ProtocolDecode(String),
    /// The server answered with a payload the caller did not expect.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    /// The dispatch queue was shut down.
    #[error("dispatch queue closed")]
    QueueClosed,
    /// Another connect attempt is already in progress.
    #[error("a connect attempt is already in progress")]
    AlreadyConnecting,
    /// The server rejected a correlated request.
    #[error("server error {code}: {message}")]
    Server {
        /// Server error code.
        code: i32,
        /// Server-provided reason.
        message: String,
    },
    /// The operation was dropped before it could complete.
    #[error("operation cancelled")]
    Cancelled,
}

impl RealtimeError {
    /// Whether a reconnect attempt that failed with this error should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RealtimeError::ConnectTimeout(_)
                | RealtimeError::Transport(_)
                | RealtimeError::ConnectionLost
                | RealtimeError::NotConnected
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RealtimeError::Transport(err.to_string())
    }
}

impl From<EnvelopeError> for RealtimeError {
    fn from(err: EnvelopeError) -> Self {
        RealtimeError::ProtocolDecode(err.to_string())
    }
}
