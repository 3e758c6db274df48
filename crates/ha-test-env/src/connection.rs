//! Connection manager
//!
//! Validates the token, opens a single authenticated connection bounded by a
//! timeout, and owns the handle until [`HassConnection::disconnect`]. There
//! are no retries.

use std::time::Duration;

use ha_ws_client::HassSocket;
use tracing::{debug, info};

use crate::auth::Credential;
use crate::config::DEFAULT_CONNECTION_TIMEOUT;
use crate::error::{HassError, HassResult};

/// Parameters for one connection attempt
#[derive(Clone)]
pub struct ConnectionConfig {
    pub hass_url: String,
    pub access_token: String,
    pub timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(hass_url: &str, access_token: &str) -> Self {
        Self {
            hass_url: hass_url.to_string(),
            access_token: access_token.to_string(),
            timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Owner of the environment's hub connection
#[derive(Debug, Default)]
pub struct HassConnection {
    credential: Option<Credential>,
    socket: Option<HassSocket>,
}

impl HassConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the connection
    ///
    /// Hitting the timeout drops the in-flight attempt.
    pub async fn connect(&mut self, config: &ConnectionConfig) -> HassResult<(Credential, HassSocket)> {
        if !Credential::validate_token(&config.access_token) {
            return Err(HassError::InvalidCredential);
        }

        let credential = Credential::new(&config.hass_url, &config.access_token);
        let ws_url = credential.ws_url();
        debug!(url = %ws_url, timeout = ?config.timeout, "Connecting to Home Assistant");

        let socket = match tokio::time::timeout(
            config.timeout,
            HassSocket::connect(&ws_url, credential.access_token()),
        )
        .await
        {
            Ok(Ok(socket)) => socket,
            Ok(Err(source)) => {
                return Err(HassError::ConnectionFailed {
                    url: credential.hass_url().to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(HassError::ConnectionTimeout {
                    url: credential.hass_url().to_string(),
                    timeout: config.timeout,
                })
            }
        };

        info!(
            url = %credential.hass_url(),
            ha_version = %socket.ha_version(),
            "Connected to Home Assistant"
        );
        self.credential = Some(credential.clone());
        self.socket = Some(socket.clone());
        Ok((credential, socket))
    }

    /// Close the connection if open. Safe to call at any time.
    pub fn disconnect(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close();
            debug!("Disconnected from Home Assistant");
        }
        self.credential = None;
    }

    pub fn connection(&self) -> Option<&HassSocket> {
        self.socket.as_ref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_without_connect() {
        let mut connection = HassConnection::new();
        connection.disconnect();
        connection.disconnect();
        assert!(!connection.is_connected());
        assert!(connection.credential().is_none());
    }

    #[tokio::test]
    async fn test_invalid_token_fails_before_io() {
        let mut connection = HassConnection::new();
        // Nothing listens on this address; validation must fail first.
        let config = ConnectionConfig::new("http://127.0.0.1:9", "short-token");

        let err = connection.connect(&config).await.unwrap_err();
        assert!(matches!(err, HassError::InvalidCredential));
        assert!(!connection.is_connected());
    }

    #[test]
    fn test_connection_config_defaults() {
        let config = ConnectionConfig::new("http://localhost:8123", "tok");
        assert_eq!(config.timeout, Duration::from_secs(30));
        let config = config.with_timeout(Duration::from_millis(250));
        assert_eq!(config.timeout, Duration::from_millis(250));
    }
}
