//! Test environments with a hub connection
//!
//! [`HassEnvironment`] wraps a base environment (the sandbox a test file runs
//! in) and, on setup, connects to the hub and injects [`HassGlobals`]. Each
//! instance is single-use:
//!
//! ```text
//! Uninitialized -> SettingUp -> Ready | MockReady -> TornDown
//! ```

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::builder::{HassBuilder, MinimalHass};
use crate::config::EnvironmentConfig;
use crate::connection::{ConnectionConfig, HassConnection};
use crate::error::{HassError, HassResult};

#[cfg(feature = "dom")]
use crate::dom::DomEnvironment;

/// Lifecycle every environment exposes to a test runner
#[async_trait]
pub trait Environment: Send {
    async fn setup(&mut self) -> HassResult<()>;
    async fn teardown(&mut self) -> HassResult<()>;
}

/// Plain sandbox without DOM support
#[derive(Debug, Default)]
pub struct NodeEnvironment {
    active: bool,
}

impl NodeEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[async_trait]
impl Environment for NodeEnvironment {
    async fn setup(&mut self) -> HassResult<()> {
        self.active = true;
        Ok(())
    }

    async fn teardown(&mut self) -> HassResult<()> {
        self.active = false;
        Ok(())
    }
}

/// Where an environment is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    Uninitialized,
    SettingUp,
    Ready,
    MockReady,
    TornDown,
}

/// Whether tests run against a live hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HassMode {
    Live,
    Mock,
}

impl HassMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HassMode::Live => "live",
            HassMode::Mock => "mock",
        }
    }
}

impl std::fmt::Display for HassMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values injected into the test's scope at setup
///
/// Written once by the environment, read-only for tests, cleared at teardown.
#[derive(Debug, Default)]
pub struct HassGlobals {
    hass: Option<MinimalHass>,
    hass_mode: Option<HassMode>,
    hass_connection: Option<HassConnection>,
}

impl HassGlobals {
    /// The hub handle; `None` in mock mode
    pub fn hass(&self) -> Option<&MinimalHass> {
        self.hass.as_ref()
    }

    /// `None` until setup has injected anything
    pub fn hass_mode(&self) -> Option<HassMode> {
        self.hass_mode
    }

    /// Connection manager; live mode only
    pub fn hass_connection(&self) -> Option<&HassConnection> {
        self.hass_connection.as_ref()
    }

    pub fn is_mock(&self) -> bool {
        self.hass_mode == Some(HassMode::Mock)
    }

    pub fn is_injected(&self) -> bool {
        self.hass_mode.is_some()
    }
}

/// Environment that gives tests a live hub connection
pub struct HassEnvironment<B = NodeEnvironment> {
    base: B,
    config: EnvironmentConfig,
    state: EnvironmentState,
    globals: HassGlobals,
    connection: Option<HassConnection>,
}

pub type HassNodeEnvironment = HassEnvironment<NodeEnvironment>;

#[cfg(feature = "dom")]
pub type HassDomEnvironment = HassEnvironment<DomEnvironment>;

impl HassEnvironment<NodeEnvironment> {
    pub fn node(config: EnvironmentConfig) -> Self {
        Self::new(NodeEnvironment::new(), config)
    }
}

#[cfg(feature = "dom")]
impl HassEnvironment<DomEnvironment> {
    pub fn dom(config: EnvironmentConfig) -> Self {
        Self::new(DomEnvironment::new(), config)
    }
}

impl<B: Environment> HassEnvironment<B> {
    pub fn new(base: B, config: EnvironmentConfig) -> Self {
        Self {
            base,
            config,
            state: EnvironmentState::Uninitialized,
            globals: HassGlobals::default(),
            connection: None,
        }
    }

    pub fn state(&self) -> EnvironmentState {
        self.state
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn globals(&self) -> &HassGlobals {
        &self.globals
    }

    /// The wrapped sandbox
    pub fn base(&self) -> &B {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut B {
        &mut self.base
    }

    /// Set up the base sandbox, then connect and inject globals
    ///
    /// With `mock_fallback` enabled, a missing token or any connection
    /// failure degrades to mock mode instead of failing.
    pub async fn setup(&mut self) -> HassResult<()> {
        if self.state != EnvironmentState::Uninitialized {
            return Err(HassError::IllegalState {
                operation: "setup",
                state: self.state,
            });
        }
        self.state = EnvironmentState::SettingUp;
        self.base.setup().await?;

        let Some(token) = self.config.access_token.clone() else {
            if self.config.mock_fallback {
                warn!("No HA_TOKEN provided, running in mock mode");
                self.enter_mock_mode();
                return Ok(());
            }
            return Err(HassError::MissingCredential);
        };

        let mut connection = HassConnection::new();
        let connection_config = ConnectionConfig::new(&self.config.hass_url, &token)
            .with_timeout(self.config.connection_timeout);

        match Self::connect_and_build(&mut connection, &connection_config).await {
            Ok(hass) => {
                info!(url = %self.config.hass_url, "Connected to Home Assistant");
                self.globals = HassGlobals {
                    hass: Some(hass),
                    hass_mode: Some(HassMode::Live),
                    hass_connection: Some(connection),
                };
                self.state = EnvironmentState::Ready;
                Ok(())
            }
            Err(e) => {
                connection.disconnect();
                self.connection = Some(connection);
                if self.config.mock_fallback {
                    warn!(error = %e, "Failed to connect to Home Assistant, falling back to mock mode");
                    self.enter_mock_mode();
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Close the connection (if any) and tear down the base sandbox
    pub async fn teardown(&mut self) -> HassResult<()> {
        if matches!(
            self.state,
            EnvironmentState::Uninitialized | EnvironmentState::TornDown
        ) {
            return Err(HassError::IllegalState {
                operation: "teardown",
                state: self.state,
            });
        }

        let globals = std::mem::take(&mut self.globals);
        if let Some(mut connection) = globals.hass_connection.or_else(|| self.connection.take()) {
            connection.disconnect();
        }
        self.state = EnvironmentState::TornDown;
        self.base.teardown().await
    }

    async fn connect_and_build(
        connection: &mut HassConnection,
        config: &ConnectionConfig,
    ) -> HassResult<MinimalHass> {
        let (credential, socket) = connection.connect(config).await?;
        HassBuilder::build(credential, socket).await
    }

    fn enter_mock_mode(&mut self) {
        self.globals = HassGlobals {
            hass: None,
            hass_mode: Some(HassMode::Mock),
            hass_connection: None,
        };
        self.state = EnvironmentState::MockReady;
    }
}

#[async_trait]
impl<B: Environment> Environment for HassEnvironment<B> {
    async fn setup(&mut self) -> HassResult<()> {
        HassEnvironment::setup(self).await
    }

    async fn teardown(&mut self) -> HassResult<()> {
        HassEnvironment::teardown(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: Option<&str>, mock_fallback: bool) -> EnvironmentConfig {
        EnvironmentConfig {
            access_token: token.map(String::from),
            mock_fallback,
            ..EnvironmentConfig::default()
        }
    }

    #[tokio::test]
    async fn test_mock_fallback_without_token() {
        let mut env = HassEnvironment::node(config(None, true));
        env.setup().await.unwrap();

        assert_eq!(env.state(), EnvironmentState::MockReady);
        assert_eq!(env.globals().hass_mode(), Some(HassMode::Mock));
        assert!(env.globals().hass().is_none());
        assert!(env.globals().hass_connection().is_none());
        assert!(env.base().is_active());
    }

    #[tokio::test]
    async fn test_missing_token_is_fatal_without_fallback() {
        let mut env = HassEnvironment::node(config(None, false));
        let err = env.setup().await.unwrap_err();

        assert!(matches!(err, HassError::MissingCredential));
        assert!(!env.globals().is_injected());
        assert_eq!(env.state(), EnvironmentState::SettingUp);

        env.teardown().await.unwrap();
        assert!(!env.base().is_active());
    }

    #[tokio::test]
    async fn test_invalid_token_degrades_to_mock() {
        let mut env = HassEnvironment::node(config(Some("too-short"), true));
        env.setup().await.unwrap();
        assert!(env.globals().is_mock());
    }

    #[tokio::test]
    async fn test_setup_twice_is_rejected() {
        let mut env = HassEnvironment::node(config(None, true));
        env.setup().await.unwrap();

        let err = env.setup().await.unwrap_err();
        assert!(matches!(
            err,
            HassError::IllegalState {
                operation: "setup",
                state: EnvironmentState::MockReady
            }
        ));
    }

    #[tokio::test]
    async fn test_teardown_guards() {
        let mut env = HassEnvironment::node(config(None, true));
        let err = env.teardown().await.unwrap_err();
        assert!(matches!(
            err,
            HassError::IllegalState {
                operation: "teardown",
                state: EnvironmentState::Uninitialized
            }
        ));

        env.setup().await.unwrap();
        env.teardown().await.unwrap();
        assert_eq!(env.state(), EnvironmentState::TornDown);
        assert!(!env.globals().is_injected());

        assert!(env.teardown().await.is_err());
        assert!(env.setup().await.is_err());
    }

    #[test]
    fn test_mode_strings() {
        assert_eq!(HassMode::Live.to_string(), "live");
        assert_eq!(serde_json::to_value(HassMode::Mock).unwrap(), "mock");
    }
}
