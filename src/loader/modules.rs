use std::collections::BTreeSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::loader::keys::{
    self, module_instance_key, strip_instance_suffix, RESOLVED_MODULE_ENTRY,
};
use crate::loader::store::{deep_merge_payload, Definitions, ModuleAddress};
use crate::loader::variables::unwrap_single;
use crate::loader::Parser;

/// A bare `var.x` / `local.x` / `module.x` reference, the shape that can't
/// be resolved from inside a module and so defers the call.
static SIMPLE_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?:var|local|module)\.[A-Za-z0-9_\-.\[\]"']+$"#).expect("valid regex"));

/// Referrer chain for one in-flight module instantiation, innermost first.
#[derive(Debug, Clone)]
pub struct NestedModulesData {
    pub file: String,
    pub module_index: usize,
    pub parent: Option<Box<NestedModulesData>>,
}

impl Parser {
    /// One pass over every live definition in `root_dir`: load each module
    /// call whose parameters are fully resolved (or every remaining call
    /// when `force_final_module_load` is set), re-enter the directory
    /// loader on the fetched content, and rewrite the resulting keys with
    /// referrer suffixes.
    ///
    /// Returns true when at least one call was skipped for unresolved
    /// parameters.
    pub(crate) fn load_modules(
        &mut self,
        root_dir: &str,
        keys_referenced_as_modules: &mut BTreeSet<String>,
        force_final_module_load: bool,
        nested_modules_data: Option<&NestedModulesData>,
    ) -> bool {
        let mut all_module_definitions = Definitions::new();
        let mut skipped_a_module = false;
        let nested_mode = self.config.enable_nested_modules;

        for file in self.store.keys() {
            // Only files of the directory being processed; instance keys
            // were already handled under their original paths.
            if self.store.dirname(&file) != root_dir {
                continue;
            }
            if keys::is_instance_key(&file) {
                continue;
            }

            let module_calls: Vec<Value> = match self.store.get(&file).and_then(|p| p.get("module"))
            {
                Some(Value::Array(calls)) => calls.clone(),
                _ => continue,
            };

            for (module_index, module_call) in module_calls.iter().enumerate() {
                let call_object = match module_call.as_object() {
                    Some(object) => object,
                    None => continue,
                };

                // One name per call object, but iterate defensively.
                for (module_call_name, module_call_data) in call_object {
                    let call_data = match module_call_data.as_object() {
                        Some(data) => data,
                        None => continue,
                    };

                    let nested_address = if nested_mode {
                        let file_key = file_key_with_nested_data(&file, nested_modules_data);
                        let address =
                            ModuleAddress::new(file_key, module_index, module_call_name.clone());
                        self.store
                            .module_to_resolved
                            .entry(address.clone())
                            .or_default();
                        Some(address)
                    } else {
                        None
                    };

                    let module_address =
                        ModuleAddress::new(file.clone(), module_index, module_call_name.clone());
                    if !nested_mode && self.store.loaded_modules.contains(&module_address) {
                        continue;
                    }

                    // Parameters passed down; "source" and "version" are
                    // reserved for the call itself.
                    let specified_vars: serde_json::Map<String, Value> = call_data
                        .iter()
                        .filter(|(key, _)| key.as_str() != "source" && key.as_str() != "version")
                        .map(|(key, value)| (key.clone(), unwrap_single(value)))
                        .collect();

                    if !force_final_module_load {
                        let has_unresolved = specified_vars.iter().any(|(key, value)| {
                            !is_acceptable_module_param(value) || !is_acceptable_param_str(key)
                        });
                        if has_unresolved {
                            skipped_a_module = true;
                            continue;
                        }
                    }
                    self.store.loaded_modules.insert(module_address);

                    let source = match extract_source(call_data) {
                        Some(source) => source,
                        None => {
                            tracing::debug!(
                                "skipping load of {}, source is not a string",
                                module_call_name
                            );
                            continue;
                        }
                    };

                    // Local sources resolve against the referrer's own
                    // directory, suffix-free.
                    let resolved_source = if source.starts_with("./") || source.starts_with("../") {
                        keys::normalize_path_join(
                            &keys::parent_dir(&strip_instance_suffix(&file)),
                            &source,
                        )
                    } else {
                        source.clone()
                    };

                    let version = extract_version(call_data);

                    // The loader is anchored at the parse root, where any
                    // downloaded external modules live.
                    let content =
                        self.loader
                            .load(Path::new(&self.root_dir), &resolved_source, &version);
                    let content_path = match content.path() {
                        Some(path) if content.loaded() => path.to_path_buf(),
                        _ => {
                            tracing::info!("got no content for {}:{}", resolved_source, version);
                            continue;
                        }
                    };
                    let content_dir = content_path.to_string_lossy().to_string();

                    if nested_mode && chain_contains(nested_modules_data, &file) {
                        tracing::debug!(
                            "skipping cyclic module reference {} -> {}",
                            file,
                            content_dir
                        );
                        continue;
                    }

                    let new_nested_modules_data = NestedModulesData {
                        file: file.clone(),
                        module_index,
                        parent: nested_modules_data.cloned().map(Box::new),
                    };

                    if let Err(e) = self.internal_dir_load(
                        &content_path,
                        Some(&specified_vars),
                        Some(&new_nested_modules_data),
                        keys_referenced_as_modules,
                    ) {
                        tracing::warn!(
                            "unable to load module (source={:?} version={:?}): {:#}",
                            resolved_source,
                            version,
                            e
                        );
                        continue;
                    }

                    let module_keys = self.store.keys_in_dir(&content_dir);
                    if module_keys.is_empty() {
                        continue;
                    }

                    // Move each fresh definition under its instance key.
                    let mut module_definitions = Definitions::new();
                    let mut newly_resolved: Vec<String> = Vec::new();
                    for key in module_keys {
                        if keys::is_instance_key(&key) {
                            continue;
                        }
                        keys_referenced_as_modules.insert(key.clone());

                        let new_key = if nested_mode {
                            self.new_nested_module_key(
                                &key,
                                &file,
                                module_index,
                                nested_modules_data,
                            )
                        } else {
                            module_instance_key(&key, &file, module_index)
                        };

                        if nested_mode && self.store.visited_keys.contains(&new_key) {
                            // Duplicate expansion of a shared leaf.
                            self.store.remove(&key);
                            continue;
                        }

                        if let Some(payload) = self.store.remove(&key) {
                            module_definitions.insert(new_key.clone(), payload);
                        }
                        self.store.keys_to_remove.insert(key.clone());

                        if nested_mode {
                            self.store.visited_keys.insert(new_key.clone());
                        }
                        newly_resolved.push(new_key);

                        self.store
                            .module_address_map
                            .entry((file.clone(), module_call_name.clone()))
                            .or_insert_with(|| module_index.to_string());
                    }

                    if newly_resolved.is_empty() && module_definitions.is_empty() {
                        continue;
                    }

                    match &nested_address {
                        Some(address) => {
                            if let Some(resolved) = self.store.module_to_resolved.get_mut(address) {
                                for key in newly_resolved {
                                    if !resolved.contains(&key) {
                                        resolved.push(key);
                                    }
                                }
                                resolved.sort();
                            }
                        }
                        None => {
                            self.append_resolved_to_call(
                                &file,
                                module_index,
                                module_call_name,
                                &newly_resolved,
                            );
                        }
                    }

                    for (key, payload) in module_definitions {
                        match all_module_definitions.get_mut(&key) {
                            Some(existing) => deep_merge_payload(existing, payload),
                            None => {
                                all_module_definitions.insert(key, payload);
                            }
                        }
                    }

                    self.store
                        .external_modules_source_map
                        .insert((resolved_source, version), content_dir);
                }
            }
        }

        for (key, payload) in all_module_definitions {
            self.store.deep_merge_insert(key, payload);
        }

        skipped_a_module
    }

    /// Attach resolved instance keys to the call's `__resolved__` list,
    /// sorted ascending, no duplicates. Flat mode only; nested mode writes
    /// the lists in the post-loop reconciliation.
    fn append_resolved_to_call(
        &mut self,
        file: &str,
        module_index: usize,
        module_call_name: &str,
        newly_resolved: &[String],
    ) {
        let call_data = match self.module_call_data_mut(file, module_index, module_call_name) {
            Some(data) => data,
            None => return,
        };

        let resolved = call_data
            .entry(RESOLVED_MODULE_ENTRY.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = resolved {
            for key in newly_resolved {
                let entry = Value::String(key.clone());
                if !list.contains(&entry) {
                    list.push(entry);
                }
            }
            list.sort_by(|a, b| a.as_str().unwrap_or("").cmp(b.as_str().unwrap_or("")));
        }
    }

    fn module_call_data_mut(
        &mut self,
        file: &str,
        module_index: usize,
        module_call_name: &str,
    ) -> Option<&mut serde_json::Map<String, Value>> {
        let payload = self.store.get_mut(file)?;
        let calls = match payload.get_mut("module") {
            Some(Value::Array(calls)) => calls,
            _ => return None,
        };
        let call = calls.get_mut(module_index)?.as_object_mut()?;
        call.get_mut(module_call_name)?.as_object_mut()
    }

    /// Compose the instance key for a definition found while expanding a
    /// module call, extending the referrer with the full ancestor chain.
    /// Also registers the single-level key as visited so a later flat-style
    /// expansion of the same leaf is recognized as a duplicate.
    fn new_nested_module_key(
        &mut self,
        key: &str,
        file: &str,
        module_index: usize,
        nested_modules_data: Option<&NestedModulesData>,
    ) -> String {
        match nested_modules_data {
            None => module_instance_key(key, file, module_index),
            Some(data) => {
                self.store
                    .visited_keys
                    .insert(module_instance_key(key, file, module_index));
                let referrer = format!("{}{}", file, nested_referrer_suffix(data));
                module_instance_key(key, &referrer, module_index)
            }
        }
    }

    /// Nested-mode post-pass: drop resolved instances whose referrer was
    /// itself relocated, then write the surviving lists into the payloads.
    pub(crate) fn update_resolved_modules(&mut self) {
        let addresses: Vec<ModuleAddress> =
            self.store.module_to_resolved.keys().cloned().collect();
        for address in addresses {
            if self.store.keys_to_remove.contains(&address.file) {
                if let Some(resolved) = self.store.module_to_resolved.remove(&address) {
                    for path in resolved {
                        self.remove_unused_path_recursive(&path);
                    }
                }
            }
        }

        let entries: Vec<(ModuleAddress, Vec<String>)> = self
            .store
            .module_to_resolved
            .iter()
            .map(|(address, resolved)| (address.clone(), resolved.clone()))
            .collect();
        for (address, resolved) in entries {
            if !self.store.contains_key(&address.file) {
                continue;
            }
            if let Some(call_data) =
                self.module_call_data_mut(&address.file, address.module_index, &address.name)
            {
                call_data.insert(
                    RESOLVED_MODULE_ENTRY.to_string(),
                    Value::Array(resolved.into_iter().map(Value::String).collect()),
                );
            }
        }
    }

    fn remove_unused_path_recursive(&mut self, path: &str) {
        self.store.remove(path);
        let matching: Vec<ModuleAddress> = self
            .store
            .module_to_resolved
            .keys()
            .filter(|address| address.file == path)
            .cloned()
            .collect();
        for address in matching {
            if let Some(resolved) = self.store.module_to_resolved.remove(&address) {
                for resolved_path in resolved {
                    self.remove_unused_path_recursive(&resolved_path);
                }
            }
        }
    }
}

/// The file key of a module call site, extended with the referrer chain
/// that led to the current directory load.
pub(crate) fn file_key_with_nested_data(
    file: &str,
    nested_modules_data: Option<&NestedModulesData>,
) -> String {
    match nested_modules_data {
        None => file.to_string(),
        Some(data) => {
            let nested = file_key_with_nested_data(&data.file, data.parent.as_deref());
            module_instance_key(file, &nested, data.module_index)
        }
    }
}

/// The `[referrer#index]` suffix for a chain, composed outward.
fn nested_referrer_suffix(data: &NestedModulesData) -> String {
    match data.parent.as_deref() {
        None => format!("[{}#{}]", data.file, data.module_index),
        Some(parent) => format!(
            "[{}{}#{}]",
            data.file,
            nested_referrer_suffix(parent),
            data.module_index
        ),
    }
}

fn chain_contains(nested_modules_data: Option<&NestedModulesData>, file: &str) -> bool {
    let mut current = nested_modules_data;
    while let Some(data) = current {
        if data.file == file {
            return true;
        }
        current = data.parent.as_deref();
    }
    false
}

fn extract_source(call_data: &serde_json::Map<String, Value>) -> Option<String> {
    match call_data.get("source") {
        Some(Value::Array(items)) => match items.first() {
            Some(Value::String(source)) => Some(source.clone()),
            _ => None,
        },
        Some(Value::String(source)) => Some(source.clone()),
        _ => None,
    }
}

fn extract_version(call_data: &serde_json::Map<String, Value>) -> String {
    match call_data.get("version").map(unwrap_single) {
        Some(Value::String(version)) => version,
        Some(Value::Null) | None => "latest".to_string(),
        Some(other) => other.to_string(),
    }
}

/// A parameter can be passed down only when it carries no unresolved
/// simple variable reference; those can't be resolved from inside the
/// module, so the call waits for a later pass.
pub fn is_acceptable_module_param(value: &Value) -> bool {
    match value {
        Value::Object(map) => map
            .iter()
            .all(|(key, value)| is_acceptable_param_str(key) && is_acceptable_module_param(value)),
        Value::Array(items) => items.iter().all(is_acceptable_module_param),
        Value::String(s) => is_acceptable_param_str(s),
        _ => true,
    }
}

pub(crate) fn is_acceptable_param_str(value: &str) -> bool {
    if SIMPLE_VAR_PATTERN.is_match(value.trim()) {
        return false;
    }
    for block in find_interpolations(value) {
        if SIMPLE_VAR_PATTERN.is_match(block.trim()) {
            return false;
        }
    }
    true
}

/// Extract the contents of every `${...}` block, honoring nested braces.
fn find_interpolations(value: &str) -> Vec<&str> {
    let bytes = value.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'{' {
            let start = i + 2;
            let mut depth = 1usize;
            let mut j = start;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth == 0 {
                found.push(&value[start..j - 1]);
            }
            i = j;
        } else {
            i += 1;
        }
    }

    found
}
