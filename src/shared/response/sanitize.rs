use serde_json::Value;

pub const PRIVATE_KEY_MARKER: char = '_';

/// Removes every mapping key starting with `_`, at any depth.
pub fn strip_private_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !key.starts_with(PRIVATE_KEY_MARKER));
            map.values_mut().for_each(strip_private_keys);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_private_keys),
        _ => {}
    }
}
