//! WebSocket message types
//!
//! Messages the hub sends to a client, and the few fixed-shape messages the
//! client sends back. Everything else goes out as caller-supplied JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

// =============================================================================
// Incoming Messages
// =============================================================================

/// Message received from the hub
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubMessage {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<ErrorInfo>,
    },
    Event {
        id: u64,
        event: Value,
    },
    Pong {
        id: u64,
    },
    #[serde(other)]
    Unknown,
}

/// Error details carried by a failed result
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorInfo {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl HubMessage {
    /// Parse a text frame, which holds either one message or a coalesced array
    ///
    /// Malformed elements of an array are skipped so the rest still arrive.
    pub fn parse_frame(text: &str) -> serde_json::Result<Vec<HubMessage>> {
        if !text.trim_start().starts_with('[') {
            return serde_json::from_str(text).map(|msg| vec![msg]);
        }

        let elements: Vec<Value> = serde_json::from_str(text)?;
        Ok(elements
            .into_iter()
            .filter_map(|element| match serde_json::from_value(element) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed message in coalesced frame");
                    None
                }
            })
            .collect())
    }
}

// =============================================================================
// Outgoing Messages
// =============================================================================

/// Authentication message sent in reply to `auth_required`
#[derive(Debug, Serialize)]
pub struct AuthMessage<'a> {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub access_token: &'a str,
}

impl<'a> AuthMessage<'a> {
    pub fn new(access_token: &'a str) -> Self {
        Self {
            msg_type: "auth",
            access_token,
        }
    }
}
