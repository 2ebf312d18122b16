use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

/// Key under which a module call's resolved instance list is attached.
pub const RESOLVED_MODULE_ENTRY: &str = "__resolved__";

/// Matches the `[referrer#index]` suffix chain of an instance key.
static MODULE_SUFFIX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[.+#.+\]").expect("valid regex"));

/// Build the definition key for a module instance:
/// `<file>[<referrer>#<index>]`.
pub fn module_instance_key(file: &str, referrer: &str, module_index: usize) -> String {
    format!("{}[{}#{}]", file, referrer, module_index)
}

/// Whether a key carries an instance suffix.
pub fn is_instance_key(key: &str) -> bool {
    key.ends_with(']')
}

/// Whether a key carries any referrer information.
pub fn is_nested(key: &str) -> bool {
    key.contains('[')
}

/// Strip the instance suffix chain, leaving the outer file path.
pub fn strip_instance_suffix(path: &str) -> String {
    MODULE_SUFFIX_PATTERN.replace(path, "").into_owned()
}

/// The file-path portion of a key, before any suffix.
pub fn base_path(key: &str) -> &str {
    match key.find('[') {
        Some(pos) => &key[..pos],
        None => key,
    }
}

/// Split an instance key into (file, referrer, index). The referrer keeps
/// its own suffix chain in nested keys.
pub fn split_instance_key(key: &str) -> Option<(&str, &str, &str)> {
    if !key.ends_with(']') {
        return None;
    }
    let open = key.find('[')?;
    let inner = &key[open + 1..key.len() - 1];
    let hash = inner.rfind('#')?;
    Some((&key[..open], &inner[..hash], &inner[hash + 1..]))
}

/// Decompose an instance key into its referrer chain, root-most first,
/// plus the bare file path. Each chain entry is `(referrer, index)` where
/// the referrer retains its own suffix chain.
pub fn nested_modules_chain(key: &str) -> (Vec<(String, String)>, String) {
    let path = base_path(key).to_string();
    let mut modules = Vec::new();
    let mut current = key.to_string();

    while is_nested(&current) {
        match split_instance_key(&current) {
            Some((_, referrer, index)) => {
                modules.push((referrer.to_string(), index.to_string()));
                current = referrer.to_string();
            }
            None => break,
        }
    }

    modules.reverse();
    (modules, path)
}

/// Canonical hash of a dependency chain, used to deduplicate trails.
pub fn unify_dependency_path(chain: &[String]) -> String {
    chain.join("->")
}

/// Parent directory of a path-shaped key.
pub fn parent_dir(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Join a relative module source onto a base directory lexically,
/// resolving `.` and `..` without touching the filesystem.
pub fn normalize_path_join(base: &str, relative: &str) -> String {
    let mut joined = PathBuf::from(base);
    for component in Path::new(relative).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                joined.pop();
            }
            Component::Normal(part) => joined.push(part),
            Component::RootDir | Component::Prefix(_) => {
                joined = PathBuf::from(relative);
                break;
            }
        }
    }
    joined.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_instance_key_roundtrip() {
        let key = module_instance_key("/r/mod/main.tf", "/r/main.tf", 0);
        assert_eq!(key, "/r/mod/main.tf[/r/main.tf#0]");
        assert!(is_instance_key(&key));
        assert_eq!(base_path(&key), "/r/mod/main.tf");
        assert_eq!(
            split_instance_key(&key),
            Some(("/r/mod/main.tf", "/r/main.tf", "0"))
        );
    }

    #[test]
    fn test_strip_instance_suffix() {
        assert_eq!(
            strip_instance_suffix("/r/mod/main.tf[/r/main.tf#0]"),
            "/r/mod/main.tf"
        );
        assert_eq!(strip_instance_suffix("/r/main.tf"), "/r/main.tf");
    }

    #[test]
    fn test_nested_chain_decomposition() {
        let key = "/r/c/main.tf[/r/b/main.tf[/r/main.tf#0]#1]";
        let (modules, path) = nested_modules_chain(key);
        assert_eq!(path, "/r/c/main.tf");
        assert_eq!(
            modules,
            vec![
                ("/r/main.tf".to_string(), "0".to_string()),
                ("/r/b/main.tf[/r/main.tf#0]".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_normalize_path_join() {
        assert_eq!(normalize_path_join("/r/env", "../modules/vpc"), "/r/modules/vpc");
        assert_eq!(normalize_path_join("/r", "./mod"), "/r/mod");
    }
}
