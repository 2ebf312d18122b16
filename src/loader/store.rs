use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;

use crate::hcl::RawPayload;
use crate::loader::keys;

/// The full definitions map: definition key → payload.
pub type Definitions = BTreeMap<String, RawPayload>;

/// Identity of one module call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleAddress {
    pub file: String,
    pub module_index: usize,
    pub name: String,
}

impl ModuleAddress {
    pub fn new(file: impl Into<String>, module_index: usize, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            module_index,
            name: name.into(),
        }
    }
}

/// Authoritative owner of all payloads plus the auxiliary module-expansion
/// bookkeeping. Everything else refers to payloads by definition key.
#[derive(Debug, Default)]
pub struct DefinitionStore {
    definitions: Definitions,
    pub module_to_resolved: BTreeMap<ModuleAddress, Vec<String>>,
    pub module_address_map: BTreeMap<(String, String), String>,
    pub external_modules_source_map: BTreeMap<(String, String), String>,
    pub visited_keys: HashSet<String>,
    pub keys_to_remove: HashSet<String>,
    pub loaded_modules: HashSet<ModuleAddress>,
    dirname_cache: HashMap<String, String>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, payload: RawPayload) {
        self.definitions.insert(key, payload);
    }

    pub fn get(&self, key: &str) -> Option<&RawPayload> {
        self.definitions.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut RawPayload> {
        self.definitions.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<RawPayload> {
        self.definitions.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.definitions.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }

    /// Keys whose parent directory equals `dir`. Instance-suffixed keys
    /// never match: their bracketed tail makes the computed parent garbage,
    /// which is exactly the exclusion the rewrite pass relies on.
    pub fn keys_in_dir(&mut self, dir: &str) -> Vec<String> {
        let keys: Vec<String> = self.definitions.keys().cloned().collect();
        keys.into_iter()
            .filter(|key| self.dirname(key) == dir)
            .collect()
    }

    /// Memoized parent-directory lookup.
    pub fn dirname(&mut self, path: &str) -> String {
        if let Some(cached) = self.dirname_cache.get(path) {
            return cached.clone();
        }
        let parent = keys::parent_dir(path);
        self.dirname_cache.insert(path.to_string(), parent.clone());
        parent
    }

    /// Merge a payload under `key`, deep-merging with any existing payload.
    pub fn deep_merge_insert(&mut self, key: String, payload: RawPayload) {
        match self.definitions.get_mut(&key) {
            Some(existing) => deep_merge_payload(existing, payload),
            None => {
                self.definitions.insert(key, payload);
            }
        }
    }

    pub fn take_definitions(&mut self) -> Definitions {
        std::mem::take(&mut self.definitions)
    }

    pub fn clear(&mut self) {
        self.definitions.clear();
        self.module_to_resolved.clear();
        self.module_address_map.clear();
        self.external_modules_source_map.clear();
        self.visited_keys.clear();
        self.keys_to_remove.clear();
        self.loaded_modules.clear();
        self.dirname_cache.clear();
    }
}

/// Deep-merge rules: mappings merge recursively, lists concatenate, and a
/// scalar conflict favors the incoming side.
pub fn deep_merge_payload(dest: &mut RawPayload, incoming: RawPayload) {
    for (key, value) in incoming {
        match dest.get_mut(&key) {
            Some(existing) => deep_merge_value(existing, value),
            None => {
                dest.insert(key, value);
            }
        }
    }
}

pub fn deep_merge_value(dest: &mut Value, incoming: Value) {
    match (dest, incoming) {
        (Value::Object(dest_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                match dest_map.get_mut(&key) {
                    Some(existing) => deep_merge_value(existing, value),
                    None => {
                        dest_map.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(dest_list), Value::Array(incoming_list)) => {
            dest_list.extend(incoming_list);
        }
        (dest_slot, incoming_value) => *dest_slot = incoming_value,
    }
}
