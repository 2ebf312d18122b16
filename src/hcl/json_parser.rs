use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::hcl::RawPayload;

/// Block types whose body sits directly under the type key, with no
/// name/address level to peel.
const UNLABELED_BLOCK_TYPES: [&str; 2] = ["locals", "terraform"];

/// Block types addressed by a type label and a name label.
const TWO_LABEL_BLOCK_TYPES: [&str; 2] = ["resource", "data"];

/// Parse a `.tf.json` (or bare `.json`) resource file into the canonical
/// payload shape: block-type → list of single-key block objects.
///
/// Terraform's JSON syntax gathers every block of a type under one object;
/// each label becomes its own block object, mirroring what the HCL decoder
/// produces. `resource` and `data` peel one level further so every
/// (type, name) pair gets a separate block, `locals` and `terraform`
/// bodies stay whole, and array values pass through untouched.
pub fn parse_json_payload(content: &str, file_path: &Path) -> Result<RawPayload> {
    let root = parse_root_object(content, file_path)?;

    Ok(root
        .into_iter()
        .filter(|(key, _)| key != "//")
        .map(|(block_type, value)| {
            let blocks = shape_blocks(&block_type, value);
            (block_type, blocks)
        })
        .collect())
}

fn shape_blocks(block_type: &str, value: Value) -> Value {
    match value {
        Value::Array(_) => value,
        Value::Object(map) => {
            if UNLABELED_BLOCK_TYPES.contains(&block_type) {
                return Value::Array(vec![Value::Object(map)]);
            }

            let mut blocks = Vec::new();
            for (label, body) in map {
                if label == "//" {
                    continue;
                }
                if TWO_LABEL_BLOCK_TYPES.contains(&block_type) {
                    blocks.extend(shape_named_blocks(label, body));
                } else {
                    blocks.push(single_key_object(label, body));
                }
            }
            Value::Array(blocks)
        }
        other => Value::Array(vec![other]),
    }
}

/// Peel the name level of a two-label block, producing one
/// `{"<type>": {"<name>": body}}` object per name.
fn shape_named_blocks(type_label: String, body: Value) -> Vec<Value> {
    match body {
        Value::Object(names) => names
            .into_iter()
            .filter(|(name, _)| name != "//")
            .map(|(name, name_body)| {
                single_key_object(type_label.clone(), single_key_object(name, name_body))
            })
            .collect(),
        other => vec![single_key_object(type_label, other)],
    }
}

fn single_key_object(key: String, value: Value) -> Value {
    let mut object = serde_json::Map::new();
    object.insert(key, value);
    Value::Object(object)
}

/// Parse a JSON variable-definition file (`terraform.tfvars.json`,
/// `*.auto.tfvars.json`) as a flat `name → value` object, no list shaping.
pub fn parse_json_object(content: &str, file_path: &Path) -> Result<RawPayload> {
    let root = parse_root_object(content, file_path)?;
    Ok(root.into_iter().filter(|(key, _)| key != "//").collect())
}

fn parse_root_object(content: &str, file_path: &Path) -> Result<RawPayload> {
    let root: Value = serde_json::from_str(content)
        .with_context(|| format!("failed to parse JSON in: {}", file_path.display()))?;

    match root {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("expected JSON object at root of {}", file_path.display()),
    }
}
