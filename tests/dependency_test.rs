use std::collections::BTreeMap;

use tflens::hcl::RawPayload;
use tflens::loader::dependency::{
    module_dependency_map, module_dependency_map_nested, next_vertices,
};
use tflens::loader::store::Definitions;

fn definitions(keys: &[&str]) -> Definitions {
    keys.iter()
        .map(|key| (key.to_string(), RawPayload::new()))
        .collect()
}

#[test]
fn test_flat_dependency_map_single_level() {
    let defs = definitions(&["/r/main.tf", "/r/mod/main.tf[/r/main.tf#0]"]);
    let (map, stripped, indices) = module_dependency_map(&defs);

    let mut expected = BTreeMap::new();
    expected.insert("/r".to_string(), vec![vec![]]);
    expected.insert("/r/mod".to_string(), vec![vec!["/r/main.tf".to_string()]]);
    assert_eq!(map, expected);

    assert!(stripped.contains_key("/r/main.tf"));
    assert!(stripped.contains_key("/r/mod/main.tf"));
    assert_eq!(
        indices.get(&("/r/mod/main.tf".to_string(), "/r/main.tf".to_string())),
        Some(&vec!["0".to_string()])
    );
}

#[test]
fn test_flat_dependency_map_chains_compose() {
    let defs = definitions(&[
        "/r/main.tf",
        "/r/mod/main.tf[/r/main.tf#0]",
        "/r/inner/main.tf[/r/mod/main.tf#0]",
    ]);
    let (map, stripped, _) = module_dependency_map(&defs);

    assert_eq!(
        map.get("/r/inner"),
        Some(&vec![vec![
            "/r/main.tf".to_string(),
            "/r/mod/main.tf".to_string()
        ]])
    );
    assert_eq!(stripped.len(), 3);
}

#[test]
fn test_flat_dependency_map_dedupes_trails() {
    // Two instances of the same module from the same referrer produce one
    // canonical trail.
    let defs = definitions(&[
        "/r/main.tf",
        "/r/mod/main.tf[/r/main.tf#0]",
        "/r/mod/main.tf[/r/main.tf#1]",
    ]);
    let (map, _, indices) = module_dependency_map(&defs);

    assert_eq!(map.get("/r/mod"), Some(&vec![vec!["/r/main.tf".to_string()]]));
    assert_eq!(
        indices.get(&("/r/mod/main.tf".to_string(), "/r/main.tf".to_string())),
        Some(&vec!["0".to_string(), "1".to_string()])
    );
}

#[test]
fn test_nested_dependency_map_decomposes_chains() {
    let defs = definitions(&[
        "/r/main.tf",
        "/r/b/main.tf[/r/main.tf#0]",
        "/r/c/main.tf[/r/b/main.tf[/r/main.tf#0]#1]",
    ]);
    let (map, indices) = module_dependency_map_nested(&defs);

    assert_eq!(map.get("/r"), Some(&vec![vec![]]));
    assert_eq!(map.get("/r/b"), Some(&vec![vec!["/r/main.tf".to_string()]]));
    assert_eq!(
        map.get("/r/c"),
        Some(&vec![vec![
            "/r/main.tf".to_string(),
            "/r/b/main.tf[/r/main.tf#0]".to_string()
        ]])
    );
    assert_eq!(
        indices.get(&(
            "/r/c/main.tf".to_string(),
            "/r/b/main.tf[/r/main.tf#0]".to_string()
        )),
        Some(&vec!["1".to_string()])
    );
}

#[test]
fn test_next_vertices_orders_by_dependency() {
    let evaluated = vec!["/r/main.tf".to_string()];
    let unevaluated = vec![
        "/r/mod/main.tf[/r/main.tf#0]".to_string(),
        "/r/inner/main.tf[/r/mod/main.tf#0]".to_string(),
    ];

    let (ready, held) = next_vertices(&evaluated, unevaluated);
    assert_eq!(ready, vec!["/r/mod/main.tf[/r/main.tf#0]".to_string()]);
    assert_eq!(held, vec!["/r/inner/main.tf[/r/mod/main.tf#0]".to_string()]);
}
