//! Test environments backed by a live Home Assistant connection
//!
//! An environment connects to the hub on setup, captures entity, service and
//! configuration snapshots, and hands tests a [`MinimalHass`] through
//! [`HassGlobals`]. With `mock_fallback` enabled, a missing token or an
//! unreachable hub yields mock mode (`hass` is `None`) so tests can skip.
//!
//! ```rust,ignore
//! use ha_test_env::{EnvironmentConfig, HassEnvironment};
//!
//! let mut env = HassEnvironment::node(EnvironmentConfig::load()?);
//! env.setup().await?;
//! if let Some(hass) = env.globals().hass() {
//!     println!("{} entities on {}", hass.states.len(), hass.config.version);
//! }
//! env.teardown().await?;
//! ```
//!
//! # Environment Variables
//!
//! - `HA_URL`: base URL of the hub (default: http://localhost:8123)
//! - `HA_TOKEN`: long-lived access token
//! - `HA_TEST_CONFIG`: optional YAML/JSON options file
//!   (`hassUrl`, `accessToken`, `mockFallback`, `connectionTimeout`)

pub mod auth;
pub mod builder;
pub mod config;
pub mod connection;
#[cfg(feature = "dom")]
pub mod dom;
pub mod environment;
pub mod error;
pub mod logging;
pub mod snapshot;
pub mod wait;

pub use auth::Credential;
pub use builder::{HassBuilder, MinimalHass};
pub use config::{EnvironmentConfig, EnvironmentOptions};
pub use connection::{ConnectionConfig, HassConnection};
#[cfg(feature = "dom")]
pub use dom::{Document, DomEnvironment};
#[cfg(feature = "dom")]
pub use environment::HassDomEnvironment;
pub use environment::{
    Environment, EnvironmentState, HassEnvironment, HassGlobals, HassMode, HassNodeEnvironment,
    NodeEnvironment,
};
pub use error::{HassError, HassResult};
pub use logging::init_test_logging;
pub use snapshot::{SnapshotStore, StateManager};
pub use wait::{wait_for_state, DEFAULT_WAIT_TIMEOUT};

pub use ha_ws_client::{HassConfig, HassEntities, HassEntity, HassServices, HassSocket};
pub use reqwest::Method;
