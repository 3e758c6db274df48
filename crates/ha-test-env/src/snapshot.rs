//! Named snapshots of entity states for test isolation

use std::collections::HashMap;

use ha_ws_client::HassEntities;

/// Name → copy of an entity map
#[derive(Debug, Default, Clone)]
pub struct SnapshotStore {
    snapshots: HashMap<String, HassEntities>,
}

/// Alias kept for callers that think of it as state management
pub type StateManager = SnapshotStore;

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `states` under `name`, replacing any previous snapshot
    pub fn save_snapshot(&mut self, name: &str, states: &HassEntities) {
        self.snapshots.insert(name.to_string(), states.clone());
    }

    pub fn get_snapshot(&self, name: &str) -> Option<&HassEntities> {
        self.snapshots.get(name)
    }

    pub fn clear_snapshot(&mut self, name: &str) {
        self.snapshots.remove(name);
    }

    pub fn clear_all(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_ws_client::HassEntity;

    fn entities(state: &str) -> HassEntities {
        let entity: HassEntity = serde_json::from_value(serde_json::json!({
            "entity_id": "light.kitchen",
            "state": state,
            "attributes": {"brightness": 128},
            "last_changed": "2026-01-07T10:00:00Z",
            "last_updated": "2026-01-07T10:00:00Z"
        }))
        .unwrap();
        HassEntities::from([(entity.entity_id.clone(), entity)])
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut store = SnapshotStore::new();
        let mut states = entities("on");
        store.save_snapshot("before", &states);

        states.get_mut("light.kitchen").unwrap().state = "off".to_string();
        states.clear();

        let saved = store.get_snapshot("before").unwrap();
        assert_eq!(saved["light.kitchen"].state, "on");
        assert_eq!(saved["light.kitchen"].attributes["brightness"], 128);
    }

    #[test]
    fn test_save_replaces_existing() {
        let mut store = SnapshotStore::new();
        store.save_snapshot("s", &entities("on"));
        store.save_snapshot("s", &entities("off"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_snapshot("s").unwrap()["light.kitchen"].state, "off");
    }

    #[test]
    fn test_clear() {
        let mut store = StateManager::new();
        store.save_snapshot("a", &entities("on"));
        store.save_snapshot("b", &entities("off"));

        store.clear_snapshot("a");
        store.clear_snapshot("never-saved");
        assert!(store.get_snapshot("a").is_none());
        assert!(store.get_snapshot("b").is_some());

        store.clear_all();
        assert!(store.is_empty());
    }
}
