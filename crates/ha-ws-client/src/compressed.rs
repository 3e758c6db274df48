//! Compressed entity state format used by `subscribe_entities`
//!
//! Each event carries additions (`a`), changes (`c`) and removals (`r`).
//! Timestamps are epoch seconds as floats.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::trace;

use crate::model::{HassContext, HassEntities, HassEntity};

/// One `subscribe_entities` event
#[derive(Debug, Default, Deserialize)]
pub struct EntityDiff {
    #[serde(default, rename = "a")]
    pub added: HashMap<String, CompressedState>,
    #[serde(default, rename = "c")]
    pub changed: HashMap<String, CompressedStateDiff>,
    #[serde(default, rename = "r")]
    pub removed: Vec<String>,
}

/// Full state of a newly added entity
#[derive(Debug, Deserialize)]
pub struct CompressedState {
    #[serde(rename = "s")]
    pub state: String,
    #[serde(default, rename = "a")]
    pub attributes: Map<String, Value>,
    #[serde(default, rename = "c")]
    pub context: Option<CompressedContext>,
    #[serde(rename = "lc")]
    pub last_changed: f64,
    #[serde(default, rename = "lu")]
    pub last_updated: Option<f64>,
}

/// Context as either a bare id or a full object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CompressedContext {
    Id(String),
    Full(HassContext),
}

/// Change to an existing entity
#[derive(Debug, Default, Deserialize)]
pub struct CompressedStateDiff {
    #[serde(default, rename = "+")]
    pub add: Option<CompressedStatePatch>,
    #[serde(default, rename = "-")]
    pub remove: Option<CompressedStateRemove>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompressedStatePatch {
    #[serde(default, rename = "s")]
    pub state: Option<String>,
    #[serde(default, rename = "a")]
    pub attributes: Option<Map<String, Value>>,
    #[serde(default, rename = "c")]
    pub context: Option<CompressedContext>,
    #[serde(default, rename = "lc")]
    pub last_changed: Option<f64>,
    #[serde(default, rename = "lu")]
    pub last_updated: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompressedStateRemove {
    #[serde(default, rename = "a")]
    pub attributes: Vec<String>,
}

impl EntityDiff {
    /// Apply this event to `entities`
    pub fn apply(self, entities: &mut HassEntities) {
        for (entity_id, compressed) in self.added {
            let last_changed = timestamp(compressed.last_changed);
            let last_updated = compressed
                .last_updated
                .map(timestamp)
                .unwrap_or(last_changed);
            let context = match compressed.context {
                Some(CompressedContext::Id(id)) => HassContext {
                    id,
                    ..HassContext::default()
                },
                Some(CompressedContext::Full(context)) => context,
                None => HassContext::default(),
            };
            entities.insert(
                entity_id.clone(),
                HassEntity {
                    entity_id,
                    state: compressed.state,
                    attributes: compressed.attributes,
                    last_changed,
                    last_updated,
                    context,
                },
            );
        }

        for (entity_id, diff) in self.changed {
            let Some(entity) = entities.get_mut(&entity_id) else {
                trace!(entity_id = %entity_id, "Change for unknown entity");
                continue;
            };

            if let Some(add) = diff.add {
                if let Some(state) = add.state {
                    entity.state = state;
                }
                match add.context {
                    Some(CompressedContext::Id(id)) => entity.context.id = id,
                    Some(CompressedContext::Full(context)) => entity.context = context,
                    None => {}
                }
                if let Some(lc) = add.last_changed {
                    entity.last_changed = timestamp(lc);
                    entity.last_updated = entity.last_changed;
                } else if let Some(lu) = add.last_updated {
                    entity.last_updated = timestamp(lu);
                }
                if let Some(attributes) = add.attributes {
                    entity.attributes.extend(attributes);
                }
            }

            if let Some(remove) = diff.remove {
                for key in remove.attributes {
                    entity.attributes.remove(&key);
                }
            }
        }

        for entity_id in self.removed {
            entities.remove(&entity_id);
        }
    }
}

fn timestamp(secs: f64) -> DateTime<Utc> {
    let millis = (secs * 1000.0).round() as i64;
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diff(value: Value) -> EntityDiff {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_additions_build_full_state() {
        let mut entities = HassEntities::new();
        diff(json!({
            "a": {
                "light.kitchen": {
                    "s": "on",
                    "a": {"brightness": 255},
                    "c": "01HXYZ",
                    "lc": 1767780000.5
                }
            }
        }))
        .apply(&mut entities);

        let kitchen = &entities["light.kitchen"];
        assert_eq!(kitchen.entity_id, "light.kitchen");
        assert_eq!(kitchen.state, "on");
        assert_eq!(kitchen.attributes["brightness"], json!(255));
        assert_eq!(kitchen.context.id, "01HXYZ");
        assert_eq!(kitchen.last_changed.timestamp_millis(), 1_767_780_000_500);
        assert_eq!(kitchen.last_updated, kitchen.last_changed);
    }

    #[test]
    fn test_changes_patch_state_and_attributes() {
        let mut entities = HassEntities::new();
        diff(json!({
            "a": {"light.kitchen": {"s": "on", "a": {"brightness": 255, "color_mode": "hs"}, "lc": 100.0}}
        }))
        .apply(&mut entities);

        diff(json!({
            "c": {
                "light.kitchen": {
                    "+": {"s": "off", "lc": 200.0, "a": {"brightness": 0}},
                    "-": {"a": ["color_mode"]}
                }
            }
        }))
        .apply(&mut entities);

        let kitchen = &entities["light.kitchen"];
        assert_eq!(kitchen.state, "off");
        assert_eq!(kitchen.attributes["brightness"], json!(0));
        assert!(!kitchen.attributes.contains_key("color_mode"));
        assert_eq!(kitchen.last_changed.timestamp(), 200);
        assert_eq!(kitchen.last_updated.timestamp(), 200);
    }

    #[test]
    fn test_update_only_moves_last_updated() {
        let mut entities = HassEntities::new();
        diff(json!({"a": {"sensor.temp": {"s": "21", "lc": 100.0}}})).apply(&mut entities);
        diff(json!({"c": {"sensor.temp": {"+": {"lu": 150.0, "c": {"id": "ctx", "user_id": "u1"}}}}}))
            .apply(&mut entities);

        let temp = &entities["sensor.temp"];
        assert_eq!(temp.last_changed.timestamp(), 100);
        assert_eq!(temp.last_updated.timestamp(), 150);
        assert_eq!(temp.context.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_removal_and_unknown_change() {
        let mut entities = HassEntities::new();
        diff(json!({"a": {"switch.a": {"s": "on", "lc": 1.0}}})).apply(&mut entities);
        diff(json!({"c": {"switch.missing": {"+": {"s": "off"}}}, "r": ["switch.a"]}))
            .apply(&mut entities);
        assert!(entities.is_empty());
    }
}
