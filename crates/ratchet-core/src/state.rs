//! Workflow-global mutable state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shared key-value scratchpad for one workflow instance.
///
/// Every node in a run receives a handle to the same state and may read or
/// patch it through explicit `get`/`set` calls; there is no ambient global
/// mutation. Paths are dotted (`"wallet.balance"`), and `set` creates
/// intermediate objects as needed. The version counter increments on every
/// mutation so callers can detect concurrent modification after a reload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalState {
    /// Root object holding all state entries.
    #[serde(default)]
    values: Map<String, Value>,
    /// Mutation counter.
    #[serde(default)]
    version: u64,
}

impl GlobalState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state seeded from a JSON object.
    ///
    /// Non-object values are wrapped under a `"value"` key so arbitrary seed
    /// payloads remain addressable.
    pub fn from_json(value: Value) -> Self {
        let values = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_owned(), other);
                map
            }
        };
        Self { values, version: 0 }
    }

    /// Returns the number of mutations applied to this state.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns whether the state holds no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads the value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.values.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Writes a value at a dotted path, creating intermediate objects.
    ///
    /// An intermediate segment that exists but is not an object is replaced.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        self.version += 1;

        let mut segments: Vec<&str> = path.split('.').collect();
        let last = match segments.pop() {
            Some(last) => last,
            None => return,
        };

        let mut current = &mut self.values;
        for segment in segments {
            let entry = current
                .entry(segment.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            match entry {
                Value::Object(map) => current = map,
                _ => return,
            }
        }
        current.insert(last.to_owned(), value.into());
    }

    /// Removes the value at a top-level key, returning it if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.version += 1;
        }
        removed
    }

    /// Returns the state as a JSON object.
    pub fn as_json(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_and_get_nested_paths() {
        let mut state = GlobalState::new();
        state.set("wallet.balance", json!(42));
        state.set("wallet.currency", json!("ETH"));

        assert_eq!(state.get("wallet.balance"), Some(&json!(42)));
        assert_eq!(state.get("wallet.currency"), Some(&json!("ETH")));
        assert_eq!(state.get("wallet.missing"), None);
        assert_eq!(state.get("missing.path"), None);
    }

    #[test]
    fn version_tracks_mutations() {
        let mut state = GlobalState::new();
        assert_eq!(state.version(), 0);
        state.set("a", json!(1));
        state.set("a", json!(2));
        assert_eq!(state.version(), 2);
        state.remove("a");
        assert_eq!(state.version(), 3);
        state.remove("a");
        assert_eq!(state.version(), 3);
    }

    #[test]
    fn set_replaces_non_object_intermediates() {
        let mut state = GlobalState::new();
        state.set("a", json!(1));
        state.set("a.b", json!(2));
        assert_eq!(state.get("a.b"), Some(&json!(2)));
    }

    #[test]
    fn from_json_wraps_scalars() {
        let state = GlobalState::from_json(json!("seed"));
        assert_eq!(state.get("value"), Some(&json!("seed")));

        let state = GlobalState::from_json(json!({"k": true}));
        assert_eq!(state.get("k"), Some(&json!(true)));
    }

    #[test]
    fn state_round_trips_through_serde() {
        let mut state = GlobalState::new();
        state.set("x.y", json!([1, 2, 3]));
        let json = serde_json::to_string(&state).unwrap();
        let back: GlobalState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
