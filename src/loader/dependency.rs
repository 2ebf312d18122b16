use std::collections::{BTreeMap, HashSet};

use crate::loader::keys::{
    base_path, is_instance_key, is_nested, nested_modules_chain, parent_dir, split_instance_key,
    unify_dependency_path,
};
use crate::loader::store::Definitions;

/// Directory → dependency chains. Each chain is the ordered sequence of
/// referrer files whose module calls led to an instance of that directory;
/// a root directory carries one empty chain.
pub type DependencyMap = BTreeMap<String, Vec<Vec<String>>>;

/// (module file, referrer) → module indices under which the referrer
/// instantiated the file's directory.
pub type DepIndexMapping = BTreeMap<(String, String), Vec<String>>;

/// Flat-mode dependency map: walk instance keys breadth-first, peeling the
/// innermost suffix once its referrer has been processed. Also returns a
/// copy of the definitions re-keyed by bare file path.
pub fn module_dependency_map(
    definitions: &Definitions,
) -> (DependencyMap, Definitions, DepIndexMapping) {
    let mut dependency_map = DependencyMap::new();
    let mut stripped_definitions = Definitions::new();
    let mut dep_index_mapping = DepIndexMapping::new();

    let mut origin_keys: Vec<String> = Vec::new();
    let mut unevaluated: Vec<String> = Vec::new();
    for key in definitions.keys() {
        if is_instance_key(key) {
            unevaluated.push(key.clone());
        } else {
            origin_keys.push(key.clone());
        }
    }

    for file_path in &origin_keys {
        dependency_map.insert(parent_dir(file_path), vec![Vec::new()]);
        if let Some(payload) = definitions.get(file_path) {
            stripped_definitions.insert(file_path.clone(), payload.clone());
        }
    }

    let (mut next_level, mut remaining) = next_vertices(&origin_keys, unevaluated);
    while !next_level.is_empty() {
        for file_path in &next_level {
            let (path, module_dependency, module_dependency_num) =
                match split_instance_key(file_path) {
                    Some(parts) => parts,
                    None => continue,
                };

            let dir_name = parent_dir(path);
            let mut current_deps: Vec<Vec<String>> = dependency_map
                .get(&parent_dir(module_dependency))
                .cloned()
                .unwrap_or_default();
            for dep in &mut current_deps {
                dep.push(module_dependency.to_string());
            }
            match dependency_map.get_mut(&dir_name) {
                Some(existing) => existing.extend(current_deps),
                None => {
                    dependency_map.insert(dir_name, current_deps);
                }
            }

            if let Some(payload) = definitions.get(file_path) {
                stripped_definitions.insert(path.to_string(), payload.clone());
            }
            origin_keys.push(path.to_string());
            dep_index_mapping
                .entry((path.to_string(), module_dependency.to_string()))
                .or_default()
                .push(module_dependency_num.to_string());
        }

        let (level, rest) = next_vertices(&origin_keys, remaining);
        next_level = level;
        remaining = rest;
    }

    for trails in dependency_map.values_mut() {
        let mut seen = HashSet::new();
        trails.retain(|trail| seen.insert(unify_dependency_path(trail)));
    }

    (dependency_map, stripped_definitions, dep_index_mapping)
}

/// Nested-mode dependency map: decompose each instance key's suffix chain
/// directly; no iteration needed because the chain is self-describing.
pub fn module_dependency_map_nested(definitions: &Definitions) -> (DependencyMap, DepIndexMapping) {
    let mut dependency_map = DependencyMap::new();
    let mut dep_index_mapping = DepIndexMapping::new();

    for key in definitions.keys() {
        if !is_nested(key) {
            dependency_map
                .entry(parent_dir(key))
                .or_default()
                .push(Vec::new());
            continue;
        }

        let (modules, path) = nested_modules_chain(key);
        dependency_map
            .entry(parent_dir(&path))
            .or_default()
            .push(modules.iter().map(|(module, _)| module.clone()).collect());
        if let Some((module, index)) = modules.last() {
            dep_index_mapping
                .entry((path.clone(), module.clone()))
                .or_default()
                .push(index.clone());
        }
    }

    for trails in dependency_map.values_mut() {
        trails.sort();
        trails.dedup();
    }

    (dependency_map, dep_index_mapping)
}

/// Split the not-yet-processed keys into those whose every suffix segment
/// refers to an already-processed key (ready now) and the rest.
///
/// A key is held back when its bare file path matches a path some other
/// held-back key still needs, so chains are peeled strictly outside-in.
pub fn next_vertices(
    evaluated_keys: &[String],
    unevaluated_keys: Vec<String>,
) -> (Vec<String>, Vec<String>) {
    let mut next_level = Vec::new();
    let mut unevaluated = Vec::new();
    let mut do_not_eval_yet: Vec<String> = Vec::new();

    for key in unevaluated_keys {
        let found = evaluated_keys
            .iter()
            .any(|evaluated| key.contains(evaluated.as_str()));
        if found {
            next_level.push(key);
        } else {
            do_not_eval_yet.push(base_path(&key).to_string());
            unevaluated.push(key);
        }
    }

    let (ready, held): (Vec<String>, Vec<String>) = next_level
        .into_iter()
        .partition(|key| !do_not_eval_yet.contains(&base_path(key).to_string()));
    unevaluated.extend(held);

    (ready, unevaluated)
}
