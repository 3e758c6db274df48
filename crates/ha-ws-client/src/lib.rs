//! Home Assistant WebSocket API client
//!
//! Client side of the protocol described at
//! https://developers.home-assistant.io/docs/api/websocket
//!
//! - `socket` - connection, auth handshake, request/result correlation, subscriptions
//! - `collections` - entity, service and config streams built on subscriptions
//! - `compressed` - the compressed entity state format of `subscribe_entities`
//! - `model` - entity, service and config data types
//! - `types` - wire message types

pub mod collections;
pub mod compressed;
pub mod error;
pub mod model;
pub mod socket;
pub mod types;

pub use collections::{
    subscribe_config, subscribe_entities, subscribe_services, ConfigStream, EntityStream,
    ServiceStream,
};
pub use error::{WsError, WsResult};
pub use model::{HassConfig, HassContext, HassEntities, HassEntity, HassService, HassServices};
pub use socket::{HassSocket, Subscription};
