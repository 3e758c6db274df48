//! Streams over the hub's entity, service and configuration collections
//!
//! Every stream yields the whole collection on each `next()`: first the
//! initial snapshot, then the collection with each later update applied.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::compressed::EntityDiff;
use crate::error::{WsError, WsResult};
use crate::model::{HassConfig, HassEntities, HassService, HassServices};
use crate::socket::{HassSocket, Subscription};

/// Live view of entity states via `subscribe_entities`
pub struct EntityStream {
    subscription: Subscription,
    entities: HassEntities,
}

/// Subscribe to entity states
pub async fn subscribe_entities(socket: &HassSocket) -> WsResult<EntityStream> {
    let subscription = socket
        .subscribe_message(json!({"type": "subscribe_entities"}))
        .await?;
    Ok(EntityStream {
        subscription,
        entities: HassEntities::new(),
    })
}

impl EntityStream {
    /// Wait for the next event and return the updated entity map
    pub async fn next(&mut self) -> WsResult<HassEntities> {
        let event = self
            .subscription
            .next_event()
            .await
            .ok_or(WsError::ConnectionClosed)?;
        let diff: EntityDiff = serde_json::from_value(event)?;
        diff.apply(&mut self.entities);
        Ok(self.entities.clone())
    }

    /// Entities as of the last event
    pub fn current(&self) -> &HassEntities {
        &self.entities
    }

    pub async fn unsubscribe(self) -> WsResult<()> {
        self.subscription.unsubscribe().await
    }
}

#[derive(Debug, Deserialize)]
struct ServiceEventData {
    domain: String,
    service: String,
}

#[derive(Debug, Deserialize)]
struct BusEvent<T> {
    event_type: String,
    data: T,
}

/// Live view of the service registry
pub struct ServiceStream {
    registered: Subscription,
    removed: Subscription,
    services: HassServices,
    initial: bool,
}

/// Subscribe to registry changes, then fetch the current registry
pub async fn subscribe_services(socket: &HassSocket) -> WsResult<ServiceStream> {
    let registered = socket
        .subscribe_message(json!({"type": "subscribe_events", "event_type": "service_registered"}))
        .await?;
    let removed = socket
        .subscribe_message(json!({"type": "subscribe_events", "event_type": "service_removed"}))
        .await?;
    let services = serde_json::from_value(socket.send_message(json!({"type": "get_services"})).await?)?;

    Ok(ServiceStream {
        registered,
        removed,
        services,
        initial: true,
    })
}

impl ServiceStream {
    /// Return the fetched registry first, then the registry after each change
    pub async fn next(&mut self) -> WsResult<HassServices> {
        if std::mem::take(&mut self.initial) {
            return Ok(self.services.clone());
        }

        let event = tokio::select! {
            event = self.registered.next_event() => event,
            event = self.removed.next_event() => event,
        }
        .ok_or(WsError::ConnectionClosed)?;

        let event: BusEvent<ServiceEventData> = serde_json::from_value(event)?;
        let ServiceEventData { domain, service } = event.data;
        match event.event_type.as_str() {
            "service_registered" => {
                debug!(domain = %domain, service = %service, "Service registered");
                self.services
                    .entry(domain)
                    .or_default()
                    .entry(service)
                    .or_insert_with(HassService::default);
            }
            "service_removed" => {
                debug!(domain = %domain, service = %service, "Service removed");
                if let Some(domain_services) = self.services.get_mut(&domain) {
                    domain_services.remove(&service);
                    if domain_services.is_empty() {
                        self.services.remove(&domain);
                    }
                }
            }
            other => debug!(event_type = %other, "Ignoring event"),
        }
        Ok(self.services.clone())
    }

    pub async fn unsubscribe(self) -> WsResult<()> {
        let registered = self.registered.unsubscribe().await;
        let removed = self.removed.unsubscribe().await;
        registered.and(removed)
    }
}

/// Live view of the core configuration
pub struct ConfigStream {
    socket: HassSocket,
    updates: Subscription,
    config: Option<HassConfig>,
}

/// Subscribe to `core_config_updated`, then fetch the current configuration
pub async fn subscribe_config(socket: &HassSocket) -> WsResult<ConfigStream> {
    let updates = socket
        .subscribe_message(json!({"type": "subscribe_events", "event_type": "core_config_updated"}))
        .await?;
    let config = fetch_config(socket).await?;

    Ok(ConfigStream {
        socket: socket.clone(),
        updates,
        config: Some(config),
    })
}

impl ConfigStream {
    /// Return the fetched configuration first, then refetch after each update
    pub async fn next(&mut self) -> WsResult<HassConfig> {
        if let Some(config) = self.config.take() {
            return Ok(config);
        }
        let _event: Value = self
            .updates
            .next_event()
            .await
            .ok_or(WsError::ConnectionClosed)?;
        fetch_config(&self.socket).await
    }

    pub async fn unsubscribe(self) -> WsResult<()> {
        self.updates.unsubscribe().await
    }
}

async fn fetch_config(socket: &HassSocket) -> WsResult<HassConfig> {
    let config = socket.send_message(json!({"type": "get_config"})).await?;
    Ok(serde_json::from_value(config)?)
}
