use std::collections::BTreeMap;

use serde_json::{Map, Value};

const KEY_SEPARATOR: &str = ".";

/// Flattens nested objects into dot separated keys: `{"web": {"port": 1922}}` becomes `{"web.port": 1922}`.
/// Empty objects disappear, arrays are kept as values. An option spelled both nested and dotted
/// is returned as the error.
pub fn flatten(data: &Map<String, Value>) -> Result<BTreeMap<String, Value>, String> {
    let mut flat = BTreeMap::new();
    flatten_into(&mut flat, data, None)?;
    Ok(flat)
}

fn flatten_into(
    flat: &mut BTreeMap<String, Value>,
    data: &Map<String, Value>,
    parent: Option<&str>,
) -> Result<(), String> {
    for (key, value) in data {
        let full_key = match parent {
            Some(parent) => format!("{parent}{KEY_SEPARATOR}{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) => flatten_into(flat, inner, Some(&full_key))?,
            other => {
                if flat.insert(full_key.clone(), other.clone()).is_some() {
                    return Err(full_key);
                }
            }
        }
    }
    Ok(())
}

/// Deep merges `overlay` into `base`. A key set on both sides is only allowed when both values are
/// objects; any other overlap is returned as the dotted path of the conflicting key.
pub fn merge(
    base: &Map<String, Value>,
    overlay: &Map<String, Value>,
) -> Result<Map<String, Value>, String> {
    merge_at(base, overlay, None)
}

fn merge_at(
    base: &Map<String, Value>,
    overlay: &Map<String, Value>,
    path: Option<&str>,
) -> Result<Map<String, Value>, String> {
    let mut result = base.clone();

    for (key, value) in overlay {
        let current_path = match path {
            Some(path) => format!("{path}{KEY_SEPARATOR}{key}"),
            None => key.clone(),
        };

        let merged = match (result.get(key), value) {
            (None, _) => value.clone(),
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                Value::Object(merge_at(existing, incoming, Some(&current_path))?)
            }
            (Some(_), _) => return Err(current_path),
        };
        result.insert(key.clone(), merged);
    }

    Ok(result)
}
