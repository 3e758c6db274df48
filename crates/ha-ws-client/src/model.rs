//! Hub data as seen by a client: entity states, service registry, core config

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity id → state
pub type HassEntities = HashMap<String, HassEntity>;

/// Domain → service name → description
pub type HassServices = HashMap<String, HashMap<String, HassService>>;

/// State of one entity at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HassEntity {
    pub entity_id: String,

    /// The state value (e.g., "on", "off", "23.5", "unavailable")
    pub state: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    pub last_changed: DateTime<Utc>,

    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub context: HassContext,
}

impl HassEntity {
    /// Domain part of the entity id (`light` for `light.kitchen`)
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or(&self.entity_id)
    }

    /// The `friendly_name` attribute, if set
    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(Value::as_str)
    }
}

/// Origin of a state change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HassContext {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Description of a registered service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HassService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub fields: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

/// Core configuration of the hub
///
/// Well-known fields are typed; everything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HassConfig {
    pub version: String,
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub time_zone: String,
    pub unit_system: Map<String, Value>,
    pub components: Vec<String>,
    pub config_dir: String,
    pub state: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
