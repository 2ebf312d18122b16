pub mod json_parser;
pub mod normalize;
pub mod parser;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::ParseError;

/// One file's parsed tree: block-type → ordered list of block objects.
/// Attribute values carry HCL2's single-element list wrapping.
pub type RawPayload = serde_json::Map<String, Value>;

/// Block types exempt from the bad-definition cleanup.
const GOOD_BLOCK_TYPES: [&str; 2] = ["locals", "terraform"];

/// ASCII identifier grammar for block name/address keys.
static ENTITY_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid regex"));

/// Load a single configuration or variable-definition file, selecting the
/// decoder by extension. Decode failures land in `parsing_errors` and the
/// file contributes nothing; traversal is never aborted for one bad file.
///
/// `clean_definitions` applies the bad-definition cleanup, which variable
/// files skip.
pub fn load_file(
    path: &Path,
    parsing_errors: &mut BTreeMap<String, ParseError>,
    clean_definitions: bool,
) -> Option<RawPayload> {
    let path_str = path.to_string_lossy().to_string();
    tracing::debug!("parsing {}", path_str);

    let content = match read_to_string_tolerant(path) {
        Ok(content) => content,
        Err(e) => {
            parsing_errors.insert(
                path_str.clone(),
                ParseError::Io {
                    path: path_str,
                    message: e.to_string(),
                },
            );
            return None;
        }
    };

    if path_str.ends_with(".json") {
        let parsed = if clean_definitions {
            json_parser::parse_json_payload(&content, path)
        } else {
            json_parser::parse_json_object(&content, path)
        };
        match parsed {
            Ok(payload) => {
                if clean_definitions {
                    Some(clean_bad_definitions(validate_malformed_definitions(
                        payload,
                    )))
                } else {
                    Some(payload)
                }
            }
            Err(e) => {
                tracing::debug!("failed while parsing file {}: {:#}", path_str, e);
                parsing_errors.insert(
                    path_str.clone(),
                    ParseError::Json {
                        path: path_str,
                        message: format!("{:#}", e),
                    },
                );
                None
            }
        }
    } else {
        match parser::parse_hcl_payload(&content, path) {
            Ok(payload) => {
                let validated = validate_malformed_definitions(payload);
                if clean_definitions {
                    Some(clean_bad_definitions(validated))
                } else {
                    Some(validated)
                }
            }
            Err(e) => {
                tracing::debug!("failed while parsing file {}: {:#}", path_str, e);
                parsing_errors.insert(
                    path_str.clone(),
                    ParseError::Hcl {
                        path: path_str,
                        message: format!("{:#}", e),
                    },
                );
                None
            }
        }
    }
}

/// Read a file as UTF-8, tolerating a byte-order mark.
fn read_to_string_tolerant(path: &Path) -> io::Result<String> {
    let content = fs::read_to_string(path)?;
    match content.strip_prefix('\u{feff}') {
        Some(stripped) => Ok(stripped.to_string()),
        None => Ok(content),
    }
}

/// Drop blocks whose single top-level key does not match the identifier
/// grammar, and empty blocks.
pub fn validate_malformed_definitions(payload: RawPayload) -> RawPayload {
    payload
        .into_iter()
        .map(|(block_type, blocks)| {
            let filtered = match blocks {
                Value::Array(list) => {
                    Value::Array(list.into_iter().filter(is_valid_block).collect())
                }
                other => other,
            };
            (block_type, filtered)
        })
        .collect()
}

fn is_valid_block(block: &Value) -> bool {
    match block {
        Value::Object(map) => match map.keys().next() {
            Some(entity_name) => ENTITY_NAME_PATTERN.is_match(entity_name),
            None => false,
        },
        _ => true,
    }
}

/// Outside `locals`/`terraform`, a mapping block is retained only when it
/// has exactly one top-level key.
pub fn clean_bad_definitions(payload: RawPayload) -> RawPayload {
    payload
        .into_iter()
        .map(|(block_type, blocks)| {
            let cleaned = if GOOD_BLOCK_TYPES.contains(&block_type.as_str()) {
                blocks
            } else {
                match blocks {
                    Value::Array(list) => Value::Array(
                        list.into_iter()
                            .filter(|definition| match definition.as_object() {
                                Some(map) => map.len() == 1,
                                None => true,
                            })
                            .collect(),
                    ),
                    other => other,
                }
            };
            (block_type, cleaned)
        })
        .collect()
}
