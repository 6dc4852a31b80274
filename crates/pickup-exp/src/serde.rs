//! JSON and YAML encoding used for plans, registries and submitted files.

use pickup_core::errors::{ErrorInfo, PickupError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Recursively orders object keys so equal values encode to equal bytes.
fn sort_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            for (key, mut child) in entries {
                sort_keys(&mut child);
                map.insert(key, child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sort_keys),
        _ => {}
    }
}

/// Compact JSON with sorted keys; the byte form behind every content id.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, PickupError> {
    let mut tree = serde_json::to_value(value).map_err(|err| encode_error("json", err))?;
    sort_keys(&mut tree);
    serde_json::to_vec(&tree).map_err(|err| encode_error("json", err))
}

pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, PickupError> {
    serde_json::from_slice(data).map_err(|err| decode_error("json", err))
}

/// Decodes an experiment plan or any other YAML document.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, PickupError> {
    serde_yaml::from_slice(data).map_err(|err| decode_error("yaml", err))
}

fn encode_error(format: &str, err: impl ToString) -> PickupError {
    PickupError::Serde(
        ErrorInfo::new(format!("encode.{format}"), "failed to encode value")
            .with_hint(err.to_string()),
    )
}

fn decode_error(format: &str, err: impl ToString) -> PickupError {
    PickupError::Serde(
        ErrorInfo::new(format!("decode.{format}"), "failed to decode document")
            .with_hint(err.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_keys_are_sorted() {
        let value = json!({"b": {"z": 1, "a": 2}, "a": [ {"y": 1, "x": 2} ]});
        let bytes = to_canonical_json_bytes(&value).expect("json");
        assert_eq!(
            String::from_utf8(bytes).expect("utf8"),
            r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn malformed_yaml_reports_decode_code() {
        let err = from_yaml_slice::<Value>(b"name: [unclosed").expect_err("yaml");
        assert_eq!(err.code(), "decode.yaml");
    }
}
