use serde_json::{json, Value};
use tflens::hcl::normalize::normalize_payload;
use tflens::hcl::RawPayload;

fn payload(value: Value) -> RawPayload {
    match value {
        Value::Object(map) => map,
        _ => panic!("payload fixtures must be objects"),
    }
}

#[test]
fn test_boolean_strings_are_coerced() {
    let normalized = normalize_payload(payload(json!({
        "resource": [{"t": {"n": {"enabled": ["true"], "disabled": ["false"]}}}]
    })));
    assert_eq!(
        Value::Object(normalized),
        json!({
            "resource": [{"t": {"n": {"enabled": [true], "disabled": [false]}}}]
        })
    );
}

#[test]
fn test_list_strings_sort_after_non_strings() {
    let normalized = normalize_payload(payload(json!({
        "locals": [{"mixed": [["z", {"k": 1}, "b", 7, "a"]]}]
    })));
    assert_eq!(
        Value::Object(normalized),
        json!({
            "locals": [{"mixed": [[{"k": 1}, 7, "a", "b", "z"]]}]
        })
    );
}

#[test]
fn test_alias_values_are_exempt() {
    let normalized = normalize_payload(payload(json!({
        "provider": [{"aws": {"alias": ["false"], "region": ["false"]}}]
    })));
    assert_eq!(
        Value::Object(normalized),
        json!({
            // alias keeps its raw shape while its sibling is coerced
            "provider": [{"aws": {"alias": ["false"], "region": [false]}}]
        })
    );
}

#[test]
fn test_normalize_is_idempotent() {
    let input = payload(json!({
        "resource": [{"t": {"n": {
            "flags": [["true", "x", 3, "false"]],
            "tags": [{"env": "dev", "team": "core"}]
        }}}],
        "variable": [{"v": {"default": ["true"]}}]
    }));

    let once = normalize_payload(input);
    let twice = normalize_payload(once.clone());
    assert_eq!(once, twice);
}

#[test]
fn test_normalized_payload_round_trips_through_json() {
    let normalized = normalize_payload(payload(json!({
        "resource": [{"t": {"n": {"count": [3], "flag": ["true"], "tags": [{"a": "b"}]}}}]
    })));

    let text = serde_json::to_string(&normalized).unwrap();
    let back: RawPayload = serde_json::from_str(&text).unwrap();
    assert_eq!(normalized, back);
}
