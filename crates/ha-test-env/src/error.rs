//! Error types for the test environment

use std::path::PathBuf;
use std::time::Duration;

use ha_ws_client::WsError;
use thiserror::Error;

use crate::environment::EnvironmentState;

/// Result type for test environment operations
pub type HassResult<T> = Result<T, HassError>;

/// Errors that can occur while preparing or using a hub connection in tests
#[derive(Debug, Error)]
pub enum HassError {
    /// Token failed the format check; no connection was attempted
    #[error("invalid access token format; provide a Home Assistant long-lived access token")]
    InvalidCredential,

    /// No token configured and mock fallback disabled
    #[error(
        "HA_TOKEN environment variable is required. \
         Generate one in Home Assistant: Profile -> Long-Lived Access Tokens"
    )]
    MissingCredential,

    /// The connection did not open within the configured timeout
    #[error("connection to {url} timed out after {timeout:?}")]
    ConnectionTimeout { url: String, timeout: Duration },

    /// Opening the connection failed
    #[error("failed to connect to Home Assistant at {url}: {source}")]
    ConnectionFailed {
        url: String,
        #[source]
        source: WsError,
    },

    /// The configuration snapshot never arrived
    #[error("failed to retrieve Home Assistant configuration: {reason}")]
    ConfigUnavailable { reason: String },

    /// REST call answered with a non-success status
    #[error("API call failed: {status_text}")]
    ApiCallFailed { status: u16, status_text: String },

    /// Entity did not reach the expected state in time
    #[error("timeout waiting for {entity_id} to reach state {expected} after {timeout:?}")]
    StateWaitTimeout {
        entity_id: String,
        expected: String,
        timeout: Duration,
    },

    /// Lifecycle method called in the wrong state
    #[error("cannot {operation} while environment is {state:?}")]
    IllegalState {
        operation: &'static str,
        state: EnvironmentState,
    },

    /// CSS selector could not be parsed
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// Failed to read an options file
    #[error("failed to read options file {path}: {source}")]
    ReadOptions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse an options file
    #[error("failed to parse options file {path}: {source}")]
    ParseOptions {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// WebSocket command or subscription failed after connecting
    #[error(transparent)]
    Socket(#[from] WsError),

    /// HTTP transport failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
