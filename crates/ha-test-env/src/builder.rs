//! Minimal hub handle for tests
//!
//! [`HassBuilder::build`] captures one snapshot each of entities, services
//! and configuration, strictly one after another, unsubscribing each stream
//! before the next is opened. The snapshots are not kept in sync afterwards.
//! A snapshot that was captured is kept even if its unsubscribe goes
//! unconfirmed.

use std::future::Future;
use std::time::Duration;

use ha_ws_client::{
    subscribe_config, subscribe_entities, subscribe_services, HassConfig, HassEntities,
    HassEntity, HassServices, HassSocket, WsError, WsResult,
};
use reqwest::{header, Client, Method};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::auth::Credential;
use crate::error::{HassError, HassResult};

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on waiting for the hub to confirm an unsubscribe
pub(crate) const UNSUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Await an unsubscribe for at most [`UNSUBSCRIBE_TIMEOUT`], logging any failure
///
/// The listener is already gone locally once the future is first polled, so
/// giving up early leaves nothing behind on this side of the connection.
pub(crate) async fn release(stream: &'static str, unsubscribe: impl Future<Output = WsResult<()>>) {
    match tokio::time::timeout(UNSUBSCRIBE_TIMEOUT, unsubscribe).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => trace!(stream, error = %e, "Unsubscribe failed"),
        Err(_) => trace!(stream, timeout = ?UNSUBSCRIBE_TIMEOUT, "Unsubscribe not confirmed"),
    }
}

/// Snapshot of a hub plus the calls tests need
pub struct MinimalHass {
    credential: Credential,
    connection: HassSocket,
    http: Client,
    pub connected: bool,
    pub states: HassEntities,
    pub services: HassServices,
    pub config: HassConfig,
}

#[derive(Serialize)]
struct CallServiceMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    domain: &'a str,
    service: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<Value>,
}

pub struct HassBuilder;

impl HassBuilder {
    /// Capture entity, service and config snapshots and assemble the handle
    pub async fn build(credential: Credential, connection: HassSocket) -> HassResult<MinimalHass> {
        let mut entities = subscribe_entities(&connection).await?;
        let states = entities.next().await?;
        release("entities", entities.unsubscribe()).await;
        debug!(count = states.len(), "Captured entity snapshot");

        let mut services_stream = subscribe_services(&connection).await?;
        let services = services_stream.next().await?;
        release("services", services_stream.unsubscribe()).await;
        debug!(domains = services.len(), "Captured service snapshot");

        let config = Self::capture_config(&connection).await?;
        let Some(config) = config else {
            return Err(HassError::ConfigUnavailable {
                reason: "no configuration payload received".to_string(),
            });
        };
        debug!(version = %config.version, "Captured config snapshot");

        let http = Client::builder().timeout(API_TIMEOUT).build()?;

        Ok(MinimalHass {
            credential,
            connection,
            http,
            connected: true,
            states,
            services,
            config,
        })
    }

    async fn capture_config(connection: &HassSocket) -> HassResult<Option<HassConfig>> {
        let unavailable = |e: WsError| HassError::ConfigUnavailable {
            reason: e.to_string(),
        };
        let mut stream = subscribe_config(connection).await.map_err(unavailable)?;
        let config = match stream.next().await {
            Ok(config) => Some(config),
            Err(WsError::ConnectionClosed) => None,
            Err(e) => return Err(unavailable(e)),
        };
        release("config", stream.unsubscribe()).await;
        Ok(config)
    }
}

impl MinimalHass {
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn connection(&self) -> &HassSocket {
        &self.connection
    }

    /// Entity state from the snapshot
    pub fn state(&self, entity_id: &str) -> Option<&HassEntity> {
        self.states.get(entity_id)
    }

    /// Whether the snapshot lists `domain.service`
    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services
            .get(domain)
            .is_some_and(|services| services.contains_key(service))
    }

    /// Call a service over the WebSocket connection
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        service_data: Option<Value>,
        target: Option<Value>,
    ) -> HassResult<Value> {
        let msg = serde_json::to_value(CallServiceMessage {
            msg_type: "call_service",
            domain,
            service,
            service_data,
            target,
        })?;
        Ok(self.connection.send_message(msg).await?)
    }

    /// Send an arbitrary WebSocket command and return its result
    pub async fn call_ws(&self, msg: Value) -> HassResult<Value> {
        Ok(self.connection.send_message(msg).await?)
    }

    /// Authenticated REST call to `{hass_url}{path}`
    pub async fn call_api(
        &self,
        method: Method,
        path: &str,
        parameters: Option<&Value>,
    ) -> HassResult<Value> {
        let url = format!("{}{}", self.credential.hass_url(), path);
        trace!(%method, url = %url, "REST call");

        let mut request = self
            .http
            .request(method, &url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.credential.access_token()),
            )
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(parameters) = parameters {
            request = request.body(serde_json::to_vec(parameters)?);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HassError::ApiCallFailed {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

impl std::fmt::Debug for MinimalHass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinimalHass")
            .field("credential", &self.credential)
            .field("connected", &self.connected)
            .field("states", &self.states.len())
            .field("services", &self.services.len())
            .field("version", &self.config.version)
            .finish()
    }
}
