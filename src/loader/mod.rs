pub mod dependency;
pub mod keys;
pub mod modules;
pub mod store;
pub mod variables;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;

use crate::error::ParseError;
use crate::hcl::{self, normalize, RawPayload};
use crate::modules::{LocalPathLoader, ModuleLoader};
use store::{Definitions, DefinitionStore};
use variables::{VarFileSet, VarMap, VarOrigin, VarSighting};

/// Default folder name a fetcher downloads external modules into.
pub const DEFAULT_EXTERNAL_MODULES_DIR: &str = ".external_modules";

/// All ambient configuration, snapshotted once. Environment is only read
/// inside `from_env`; `default()` is fully programmatic so tests stay
/// deterministic.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Nested instance addressing (suffix chains compose recursively).
    pub enable_nested_modules: bool,
    /// Skip dot-directories while walking the root.
    pub ignore_hidden_directories: bool,
    /// Allow resolving external module sources from the download folder.
    pub download_external_modules: bool,
    /// Folder name external modules are downloaded into.
    pub external_modules_download_path: String,
    /// Regexes; a directory or file whose path matches any is skipped.
    pub excluded_paths: Vec<String>,
    /// Explicit var-files, applied in this order.
    pub vars_files: Vec<String>,
    /// Environment snapshot; `TF_VAR_*` entries become variable bindings.
    pub env_vars: BTreeMap<String, String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            enable_nested_modules: false,
            ignore_hidden_directories: true,
            download_external_modules: false,
            external_modules_download_path: DEFAULT_EXTERNAL_MODULES_DIR.to_string(),
            excluded_paths: Vec::new(),
            vars_files: Vec::new(),
            env_vars: BTreeMap::new(),
        }
    }
}

impl ParserConfig {
    /// Snapshot the process environment. This is the single boundary at
    /// which ambient state enters the loader.
    pub fn from_env() -> Self {
        let env_vars: BTreeMap<String, String> = std::env::vars().collect();
        Self {
            enable_nested_modules: env_vars
                .get("TFLENS_ENABLE_NESTED_MODULES")
                .map(|v| env_truthy(v))
                .unwrap_or(false),
            ignore_hidden_directories: env_vars
                .get("TFLENS_IGNORE_HIDDEN_DIRECTORIES")
                .map(|v| env_truthy(v))
                .unwrap_or(true),
            external_modules_download_path: env_vars
                .get("EXTERNAL_MODULES_DIR")
                .cloned()
                .unwrap_or_else(|| DEFAULT_EXTERNAL_MODULES_DIR.to_string()),
            env_vars,
            ..Self::default()
        }
    }
}

fn env_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "t" | "on"
    )
}

/// Everything one `parse_directory` run produced.
#[derive(Debug)]
pub struct LoadResult {
    /// Definition key → normalized payload.
    pub definitions: Definitions,
    /// File path → the error that made it contribute nothing.
    pub parsing_errors: BTreeMap<String, ParseError>,
    /// Directory → winning variable bindings for that directory's load.
    pub variables: BTreeMap<String, VarMap>,
    /// Every variable binding observed at any precedence tier.
    pub variable_sightings: Vec<VarSighting>,
    /// (referrer file, module name) → module index, as a string.
    pub module_address_map: BTreeMap<(String, String), String>,
    /// (source, version) → content path for resolved external modules.
    pub external_modules_source_map: BTreeMap<(String, String), String>,
}

/// The directory loader/expander. Single-threaded by design: one `Parser`
/// per root directory; instantiate another for concurrent roots.
pub struct Parser {
    pub(crate) config: ParserConfig,
    pub(crate) loader: Box<dyn ModuleLoader>,
    pub(crate) store: DefinitionStore,
    pub(crate) parsed_directories: HashSet<String>,
    pub(crate) loaded_files_map: HashMap<String, Option<RawPayload>>,
    pub(crate) parsing_errors: BTreeMap<String, ParseError>,
    pub(crate) variable_sightings: Vec<VarSighting>,
    pub(crate) var_maps: BTreeMap<String, VarMap>,
    pub(crate) excluded_patterns: Vec<Regex>,
    pub(crate) root_dir: String,
}

impl Parser {
    pub fn new(config: ParserConfig) -> Self {
        let loader = LocalPathLoader::new(
            config.download_external_modules,
            config.external_modules_download_path.clone(),
        );
        Self::with_loader(config, Box::new(loader))
    }

    /// Use a custom module loader; the seam for tests and for callers with
    /// their own fetching pipeline.
    pub fn with_loader(config: ParserConfig, loader: Box<dyn ModuleLoader>) -> Self {
        Self {
            config,
            loader,
            store: DefinitionStore::new(),
            parsed_directories: HashSet::new(),
            loaded_files_map: HashMap::new(),
            parsing_errors: BTreeMap::new(),
            variable_sightings: Vec::new(),
            var_maps: BTreeMap::new(),
            excluded_patterns: Vec::new(),
            root_dir: String::new(),
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn parsing_errors(&self) -> &BTreeMap<String, ParseError> {
        &self.parsing_errors
    }

    /// Load and expand everything under `directory`.
    ///
    /// Per-file and per-module failures are captured (`parsing_errors`) or
    /// logged and skipped; the only outward error is a root directory that
    /// cannot be enumerated at all.
    pub fn parse_directory(&mut self, directory: &Path) -> Result<LoadResult> {
        let root = fs::canonicalize(directory)
            .with_context(|| format!("unable to read root directory {}", directory.display()))?;
        self.reset();
        self.root_dir = root.to_string_lossy().to_string();
        self.excluded_patterns = compile_excluded_patterns(&self.config.excluded_paths);

        let mut keys_referenced_as_modules: BTreeSet<String> = BTreeSet::new();

        let directories: Vec<PathBuf> = walkdir::WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| self.keep_entry(entry))
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.into_path())
            .collect();

        for dir in directories {
            let dir_string = dir.to_string_lossy().to_string();
            if self.check_process_dir(&dir_string) {
                self.internal_dir_load(&dir, None, None, &mut keys_referenced_as_modules)?;
            }
        }

        // Anything that was instantiated as a module no longer lives under
        // its plain key.
        for key in &keys_referenced_as_modules {
            self.store.remove(key);
        }

        if self.config.enable_nested_modules {
            self.update_resolved_modules();
        }

        let definitions = normalize::normalize_definitions(self.store.take_definitions());

        Ok(LoadResult {
            definitions,
            parsing_errors: std::mem::take(&mut self.parsing_errors),
            variables: std::mem::take(&mut self.var_maps),
            variable_sightings: std::mem::take(&mut self.variable_sightings),
            module_address_map: self.store.module_address_map.clone(),
            external_modules_source_map: self.store.external_modules_source_map.clone(),
        })
    }

    /// Parse one configuration file (`.tf`, `.tf.json`, `.hcl`) into its
    /// normalized payload. Errors go to the parser's sink.
    pub fn parse_file(&mut self, file: &Path) -> Option<RawPayload> {
        let name = file.to_string_lossy();
        if !(name.ends_with(".tf") || name.ends_with(".tf.json") || name.ends_with(".hcl")) {
            return None;
        }
        let payload = hcl::load_file(file, &mut self.parsing_errors, true)?;
        Some(normalize::normalize_payload(payload))
    }

    fn reset(&mut self) {
        self.store.clear();
        self.parsed_directories.clear();
        self.loaded_files_map.clear();
        self.parsing_errors.clear();
        self.variable_sightings.clear();
        self.var_maps.clear();
    }

    /// Mark a directory processed; returns true the first time.
    pub(crate) fn check_process_dir(&mut self, directory: &str) -> bool {
        self.parsed_directories.insert(directory.to_string())
    }

    fn keep_entry(&self, entry: &walkdir::DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        let name = match entry.file_name().to_str() {
            Some(name) => name,
            None => return false,
        };
        if self.config.ignore_hidden_directories && name.starts_with('.') {
            return false;
        }
        if name == self.config.external_modules_download_path {
            return false;
        }
        let path = entry.path().to_string_lossy();
        !self
            .excluded_patterns
            .iter()
            .any(|pattern| pattern.is_match(&path))
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excluded_patterns
            .iter()
            .any(|pattern| pattern.is_match(path))
    }

    /// Load one directory: scan files, seed variable defaults, resolve
    /// variable precedence, then run the module-load loop. Re-entered by
    /// the module resolver for fetched module content.
    pub(crate) fn internal_dir_load(
        &mut self,
        directory: &Path,
        specified_vars: Option<&serde_json::Map<String, Value>>,
        nested_modules_data: Option<&modules::NestedModulesData>,
        keys_referenced_as_modules: &mut BTreeSet<String>,
    ) -> Result<()> {
        let dir_string = directory.to_string_lossy().to_string();
        tracing::debug!("loading directory {}", dir_string);

        let mut entries: Vec<PathBuf> = fs::read_dir(directory)
            .with_context(|| format!("failed to read directory {}", dir_string))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        // Stage 1a: classify directory contents.
        let mut hcl_tfvars: Option<PathBuf> = None;
        let mut json_tfvars: Option<PathBuf> = None;
        let mut auto_var_files: Vec<PathBuf> = Vec::new();
        let mut explicit_var_files: Vec<PathBuf> = Vec::new();
        let mut tf_files: Vec<PathBuf> = Vec::new();

        for path in entries {
            if !path.is_file() {
                continue;
            }
            let path_str = path.to_string_lossy().to_string();
            if self.is_excluded(&path_str) {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };

            if name == "terraform.tfvars.json" {
                json_tfvars = Some(path);
            } else if name == "terraform.tfvars" {
                hcl_tfvars = Some(path);
            } else if name.ends_with(".auto.tfvars.json") || name.ends_with(".auto.tfvars") {
                auto_var_files.push(path);
            } else if self.config.vars_files.iter().any(|f| *f == path_str) {
                explicit_var_files.push(path);
            } else if name.ends_with(".tf") || name.ends_with(".tf.json") || name.ends_with(".hcl")
            {
                tf_files.push(path);
            }
        }

        // Caller order, not filesystem order.
        explicit_var_files.sort_by_key(|path| {
            let path_str = path.to_string_lossy().to_string();
            self.config
                .vars_files
                .iter()
                .position(|f| *f == path_str)
                .unwrap_or(usize::MAX)
        });

        // Stage 1b: parse resource files and seed variable defaults.
        let mut var_map = VarMap::new();
        for (file, data) in self.load_files(&tf_files, true) {
            let data = match data {
                Some(data) if !data.is_empty() => data,
                _ => continue,
            };
            let json_shaped = file.ends_with(".json");
            for (name, value) in extract_variable_defaults(&data, json_shaped) {
                variables::bind(
                    &mut var_map,
                    &mut self.variable_sightings,
                    &name,
                    value,
                    VarOrigin::Default { file: file.clone() },
                );
            }
            self.store.insert(file, data);
        }

        // Stage 2: apply variable precedence.
        let file_set = VarFileSet {
            hcl_tfvars: self.load_var_file(hcl_tfvars.as_deref()),
            json_tfvars: self.load_var_file(json_tfvars.as_deref()),
            auto_var_files: self.load_var_files(&auto_var_files),
            explicit_var_files: self.load_var_files(&explicit_var_files),
        };
        variables::resolve(
            &mut var_map,
            &mut self.variable_sightings,
            &self.config.env_vars,
            file_set,
            specified_vars,
        );
        self.var_maps.insert(dir_string.clone(), var_map);

        // Stage 3: the module-load loop. Modules may only become loadable
        // once other modules are in, so iterate; a pass that skipped a call
        // forces the next (final) pass through without resolution, and the
        // circuit breaker caps the whole thing at ten passes.
        let mut force_final_module_load = false;
        for pass in 0..10 {
            tracing::debug!("module load loop {} for {}", pass, dir_string);

            if self.config.enable_nested_modules {
                // Keep the outer walk from re-processing this directory.
                self.parsed_directories.insert(dir_string.clone());
            }

            let skipped_a_module = self.load_modules(
                &dir_string,
                keys_referenced_as_modules,
                force_final_module_load,
                nested_modules_data,
            );

            if !skipped_a_module {
                break;
            }
            if force_final_module_load {
                break;
            }
            force_final_module_load = true;
        }

        Ok(())
    }

    /// Parse files through the per-parser cache, preserving input order.
    pub(crate) fn load_files(
        &mut self,
        files: &[PathBuf],
        clean_definitions: bool,
    ) -> Vec<(String, Option<RawPayload>)> {
        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let path_str = file.to_string_lossy().to_string();
            if let Some(cached) = self.loaded_files_map.get(&path_str) {
                results.push((path_str, cached.clone()));
                continue;
            }
            let data = hcl::load_file(file, &mut self.parsing_errors, clean_definitions);
            self.loaded_files_map.insert(path_str.clone(), data.clone());
            results.push((path_str, data));
        }
        results
    }

    fn load_var_file(&mut self, file: Option<&Path>) -> Option<(String, RawPayload)> {
        let file = file?;
        let (path, data) = self.load_files(&[file.to_path_buf()], false).pop()?;
        data.map(|payload| (path, payload))
    }

    fn load_var_files(&mut self, files: &[PathBuf]) -> Vec<(String, RawPayload)> {
        self.load_files(files, false)
            .into_iter()
            .filter_map(|(path, data)| data.map(|payload| (path, payload)))
            .collect()
    }
}

fn compile_excluded_patterns(excluded_paths: &[String]) -> Vec<Regex> {
    excluded_paths
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!("ignoring invalid exclusion pattern {:?}: {}", pattern, e);
                None
            }
        })
        .collect()
}

/// Pull `default` values out of a payload's `variable` blocks. HCL-derived
/// defaults carry the single-element list wrapping and are unwrapped;
/// JSON-shaped defaults are taken as-is.
fn extract_variable_defaults(payload: &RawPayload, json_shaped: bool) -> Vec<(String, Value)> {
    let mut defaults = Vec::new();
    let var_blocks = match payload.get("variable") {
        Some(Value::Array(blocks)) => blocks,
        _ => return defaults,
    };

    for block in var_blocks {
        let block = match block.as_object() {
            Some(block) => block,
            None => continue,
        };
        for (var_name, var_definition) in block {
            let definition = match var_definition.as_object() {
                Some(definition) => definition,
                None => continue,
            };
            match definition.get("default") {
                Some(Value::Null) | None => {}
                Some(Value::Array(items)) if !json_shaped => {
                    if let Some(first) = items.first() {
                        defaults.push((var_name.clone(), first.clone()));
                    }
                }
                Some(other) => defaults.push((var_name.clone(), other.clone())),
            }
        }
    }

    defaults
}
