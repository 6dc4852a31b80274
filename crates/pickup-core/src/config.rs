//! Key/value configuration describing one simulation's full parameter set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value stored under a configuration key (numbers, strings, lists, nested maps).
pub type ParamValue = Value;

/// Opaque parameter mapping owned by a single simulation instance.
///
/// Keys are kept in sorted order so serialized configurations are stable.
/// Cloning performs a deep copy; no value is ever shared between two
/// configurations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    params: BTreeMap<String, ParamValue>,
}

impl Configuration {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// Stores `value` under `key`, returning the value it replaced.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        self.params.insert(key.into(), value.into())
    }

    /// Builder variant of [`Configuration::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Removes `key`, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.params.remove(key)
    }

    /// Returns true when `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Copies every entry of `other` into this configuration; `other` wins on conflicts.
    pub fn merge(&mut self, other: &Configuration) {
        for (key, value) in &other.params {
            self.params.insert(key.clone(), value.clone());
        }
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.params.iter()
    }

    /// Iterates over keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.params.keys()
    }

    /// Number of keys set.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true when no key is set.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Consumes the configuration and returns the underlying map.
    pub fn into_map(self) -> BTreeMap<String, ParamValue> {
        self.params
    }
}

impl From<BTreeMap<String, ParamValue>> for Configuration {
    fn from(params: BTreeMap<String, ParamValue>) -> Self {
        Self { params }
    }
}

impl<K: Into<String>> FromIterator<(K, ParamValue)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, ParamValue)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clones_do_not_share_nested_values() {
        let base = Configuration::new().with("Serialization_Time_Steps", json!([3650]));
        let mut copy = base.clone();
        if let Some(Value::Array(items)) = copy.params.get_mut("Serialization_Time_Steps") {
            items.push(json!(7300));
        }
        assert_eq!(base.get("Serialization_Time_Steps"), Some(&json!([3650])));
        assert_eq!(copy.get("Serialization_Time_Steps"), Some(&json!([3650, 7300])));
    }

    #[test]
    fn merge_prefers_incoming_values() {
        let mut base = Configuration::new().with("a", 1).with("b", 2);
        let overlay = Configuration::new().with("b", 3).with("c", 4);
        base.merge(&overlay);
        assert_eq!(base.get("b"), Some(&json!(3)));
        assert_eq!(base.len(), 3);
    }

    #[test]
    fn serializes_as_plain_object() {
        let config = Configuration::new().with("Run_Number", 4);
        let text = serde_json::to_string(&config).expect("json");
        assert_eq!(text, r#"{"Run_Number":4}"#);
    }
}
