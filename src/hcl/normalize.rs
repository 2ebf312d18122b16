use std::collections::BTreeMap;

use serde_json::Value;

use crate::hcl::RawPayload;

/// Canonicalize every payload in a definitions map. Idempotent.
pub fn normalize_definitions(
    definitions: BTreeMap<String, RawPayload>,
) -> BTreeMap<String, RawPayload> {
    definitions
        .into_iter()
        .map(|(key, payload)| (key, normalize_payload(payload)))
        .collect()
}

/// Canonicalize one payload:
/// - `"true"` / `"false"` strings become booleans;
/// - list elements are normalized, then reordered as non-strings (original
///   relative order) followed by strings sorted ascending;
/// - `alias` attribute values are left untouched;
/// - mapping keys are in ascending order (the backing map is ordered).
pub fn normalize_payload(payload: RawPayload) -> RawPayload {
    normalize_entries(payload)
}

fn normalize_entries(map: serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
    let mut entries: Vec<(String, Value)> = map.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
        .into_iter()
        .map(|(key, value)| {
            if key == "alias" {
                (key, value)
            } else {
                let normalized = normalize_value(value);
                (key, normalized)
            }
        })
        .collect()
}

fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(normalize_entries(map)),
        Value::Array(items) => Value::Array(normalize_list(items)),
        Value::String(s) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(s),
        },
        other => other,
    }
}

fn normalize_list(items: Vec<Value>) -> Vec<Value> {
    let mut non_strings = Vec::new();
    let mut strings = Vec::new();

    for item in items {
        match normalize_value(item) {
            Value::String(s) => strings.push(s),
            other => non_strings.push(other),
        }
    }

    strings.sort();
    non_strings.extend(strings.into_iter().map(Value::String));
    non_strings
}
