//! Error types for the WebSocket client

use thiserror::Error;

/// Result type for WebSocket client operations
pub type WsResult<T> = Result<T, WsError>;

/// Errors that can occur while talking to the hub over WebSocket
#[derive(Debug, Error)]
pub enum WsError {
    /// The WebSocket transport could not be opened
    #[error("WebSocket connection to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// The transport failed after the connection was opened
    #[error("WebSocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The hub rejected the access token
    #[error("authentication rejected by hub: {message}")]
    AuthInvalid { message: String },

    /// The hub sent something other than what the protocol step expects
    #[error("unexpected message during {phase}: {message}")]
    UnexpectedMessage { phase: &'static str, message: String },

    /// Outgoing commands must be JSON objects
    #[error("invalid outgoing message: {reason}")]
    InvalidMessage { reason: String },

    /// The hub answered a command with `success: false`
    #[error("command failed ({code}): {message}")]
    CommandFailed { code: String, message: String },

    /// The connection closed before the operation completed
    #[error("connection closed")]
    ConnectionClosed,

    /// A payload could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
