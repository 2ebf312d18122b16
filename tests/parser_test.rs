use std::fs;
use std::path::PathBuf;

use serde_json::json;
use tempfile::TempDir;
use tflens::loader::{Parser, ParserConfig};

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn root(dir: &TempDir) -> PathBuf {
    fs::canonicalize(dir.path()).expect("tempdir should canonicalize")
}

fn key(dir: &TempDir, name: &str) -> String {
    root(dir).join(name).to_string_lossy().to_string()
}

// ─── Single-file loading ─────────────────────────────────────────────────────

#[test]
fn test_parse_single_resource_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("main.tf"),
        r#"
resource "aws_s3_bucket" "b" {
  bucket = "x"
}
"#,
    )
    .unwrap();

    let mut parser = Parser::new(ParserConfig::default());
    let result = parser.parse_directory(dir.path()).unwrap();

    assert_eq!(result.definitions.len(), 1);
    let payload = result
        .definitions
        .get(&key(&dir, "main.tf"))
        .expect("main.tf should be loaded");
    assert_eq!(
        payload.get("resource").unwrap(),
        &json!([{"aws_s3_bucket": {"b": {"bucket": ["x"]}}}])
    );
    assert!(result.parsing_errors.is_empty());
}

#[test]
fn test_parse_tf_json_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("main.tf.json"),
        r#"{"resource": {"aws_s3_bucket": {"b": {"bucket": "x"}}}}"#,
    )
    .unwrap();

    let mut parser = Parser::new(ParserConfig::default());
    let result = parser.parse_directory(dir.path()).unwrap();

    let payload = result
        .definitions
        .get(&key(&dir, "main.tf.json"))
        .expect("main.tf.json should be loaded");
    assert_eq!(
        payload.get("resource").unwrap(),
        &json!([{"aws_s3_bucket": {"b": {"bucket": "x"}}}])
    );
}

#[test]
fn test_tf_json_resources_explode_per_type_and_name() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("main.tf.json"),
        r#"{
            "resource": {"aws_s3_bucket": {"b1": {"bucket": "x"}, "b2": {"bucket": "y"}}},
            "data": {"aws_ami": {"a1": {"owners": ["self"]}, "a2": {"owners": ["self"]}}}
        }"#,
    )
    .unwrap();

    let mut parser = Parser::new(ParserConfig::default());
    let result = parser.parse_directory(dir.path()).unwrap();

    // One single-key block per (type, name) pair, exactly as the HCL
    // decoder shapes two separate resource blocks.
    let payload = result.definitions.get(&key(&dir, "main.tf.json")).unwrap();
    assert_eq!(
        payload.get("resource").unwrap(),
        &json!([
            {"aws_s3_bucket": {"b1": {"bucket": "x"}}},
            {"aws_s3_bucket": {"b2": {"bucket": "y"}}}
        ])
    );
    assert_eq!(
        payload.get("data").unwrap(),
        &json!([
            {"aws_ami": {"a1": {"owners": ["self"]}}},
            {"aws_ami": {"a2": {"owners": ["self"]}}}
        ])
    );
}

#[test]
fn test_tf_json_blocks_explode_per_name() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("vars.tf.json"),
        r#"{"variable": {"a": {"default": "x"}, "b": {"default": "y"}}}"#,
    )
    .unwrap();

    let mut parser = Parser::new(ParserConfig::default());
    let result = parser.parse_directory(dir.path()).unwrap();

    let payload = result.definitions.get(&key(&dir, "vars.tf.json")).unwrap();
    assert_eq!(
        payload.get("variable").unwrap(),
        &json!([{"a": {"default": "x"}}, {"b": {"default": "y"}}])
    );
}

#[test]
fn test_parse_error_is_captured_and_traversal_continues() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bad.tf"), "this is not hcl {{{").unwrap();
    fs::write(dir.path().join("good.tf"), r#"locals { a = 1 }"#).unwrap();

    let mut parser = Parser::new(ParserConfig::default());
    let result = parser.parse_directory(dir.path()).unwrap();

    assert!(result.definitions.contains_key(&key(&dir, "good.tf")));
    assert!(!result.definitions.contains_key(&key(&dir, "bad.tf")));
    assert!(result.parsing_errors.contains_key(&key(&dir, "bad.tf")));
}

#[test]
fn test_byte_order_mark_is_tolerated() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("main.tf"),
        "\u{feff}resource \"t\" \"n\" {\n  v = 1\n}\n",
    )
    .unwrap();

    let mut parser = Parser::new(ParserConfig::default());
    let result = parser.parse_directory(dir.path()).unwrap();

    assert!(result.parsing_errors.is_empty());
    assert!(result.definitions.contains_key(&key(&dir, "main.tf")));
}

// ─── Sanity filters ──────────────────────────────────────────────────────────

#[test]
fn test_malformed_block_names_are_dropped() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("main.tf.json"),
        r#"{"resource": {"9bad": {"n": {"v": 1}}, "good_type": {"n": {"v": 1}}}}"#,
    )
    .unwrap();

    let mut parser = Parser::new(ParserConfig::default());
    let result = parser.parse_directory(dir.path()).unwrap();

    let payload = result.definitions.get(&key(&dir, "main.tf.json")).unwrap();
    assert_eq!(
        payload.get("resource").unwrap(),
        &json!([{"good_type": {"n": {"v": 1}}}])
    );
}

#[test]
fn test_multi_key_definitions_are_cleaned_outside_locals_and_terraform() {
    let dir = TempDir::new().unwrap();
    // An array body bypasses the per-name explosion, leaving a two-key
    // block object that the cleanup should drop.
    fs::write(
        dir.path().join("main.tf.json"),
        r#"{"resource": [{"a": {}, "b": {}}], "terraform": {"required_version": ">= 1.0"}}"#,
    )
    .unwrap();

    let mut parser = Parser::new(ParserConfig::default());
    let result = parser.parse_directory(dir.path()).unwrap();

    let payload = result.definitions.get(&key(&dir, "main.tf.json")).unwrap();
    assert_eq!(payload.get("resource").unwrap(), &json!([]));
    assert_eq!(
        payload.get("terraform").unwrap(),
        &json!([{"required_version": ">= 1.0"}])
    );
}

#[test]
fn test_unresolved_references_render_as_interpolations() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("main.tf"),
        r#"
resource "t" "n" {
  v = var.x
  w = local.name
}
"#,
    )
    .unwrap();

    let mut parser = Parser::new(ParserConfig::default());
    let result = parser.parse_directory(dir.path()).unwrap();

    let payload = result.definitions.get(&key(&dir, "main.tf")).unwrap();
    let attrs = &payload.get("resource").unwrap()[0]["t"]["n"];
    assert_eq!(attrs["v"], json!(["${var.x}"]));
    assert_eq!(attrs["w"], json!(["${local.name}"]));
}

// ─── parse_file ──────────────────────────────────────────────────────────────

#[test]
fn test_parse_file_returns_normalized_payload() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("main.tf");
    fs::write(&file, r#"resource "t" "n" { enabled = "true" }"#).unwrap();

    let mut parser = Parser::new(ParserConfig::default());
    let payload = parser.parse_file(&file).expect("should parse");
    assert_eq!(
        payload.get("resource").unwrap(),
        &json!([{"t": {"n": {"enabled": [true]}}}])
    );
}

#[test]
fn test_parse_file_rejects_other_extensions() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("terraform.tfvars");
    fs::write(&file, "v = 1").unwrap();

    let mut parser = Parser::new(ParserConfig::default());
    assert!(parser.parse_file(&file).is_none());
}

// ─── Walk rules ──────────────────────────────────────────────────────────────

#[test]
fn test_hidden_and_excluded_directories_are_skipped() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.tf"), "locals { a = 1 }").unwrap();
    fs::create_dir(dir.path().join(".hidden")).unwrap();
    fs::write(dir.path().join(".hidden/other.tf"), "locals { b = 2 }").unwrap();
    fs::create_dir(dir.path().join("skipme")).unwrap();
    fs::write(dir.path().join("skipme/other.tf"), "locals { c = 3 }").unwrap();

    let mut config = ParserConfig::default();
    config.excluded_paths.push("skipme".to_string());
    let mut parser = Parser::new(config);
    let result = parser.parse_directory(dir.path()).unwrap();

    assert_eq!(result.definitions.len(), 1);
    assert!(result.definitions.contains_key(&key(&dir, "main.tf")));
}
