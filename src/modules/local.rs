use std::collections::HashMap;
use std::path::Path;

use crate::modules::{ModuleContent, ModuleLoader};

/// Resolves module sources that already exist on disk: absolute and
/// root-relative directories, plus external modules a fetcher has placed
/// under `<root>/<external folder>/<source>/<version>`.
///
/// Never downloads anything. Results are cached per `(source, version)`.
#[derive(Debug)]
pub struct LocalPathLoader {
    download_external_modules: bool,
    external_modules_folder_name: String,
    content_cache: HashMap<String, ModuleContent>,
}

impl LocalPathLoader {
    pub fn new(download_external_modules: bool, external_modules_folder_name: String) -> Self {
        Self {
            download_external_modules,
            external_modules_folder_name,
            content_cache: HashMap::new(),
        }
    }

    pub fn with_cache(mut self, cache: HashMap<String, ModuleContent>) -> Self {
        self.content_cache = cache;
        self
    }

    fn resolve(&self, root_dir: &Path, source: &str, version: &str) -> ModuleContent {
        let candidate = Path::new(source);
        if candidate.is_absolute() {
            if candidate.is_dir() {
                return ModuleContent::new(candidate.to_path_buf());
            }
            return ModuleContent::absent();
        }

        let local = root_dir.join(source);
        if local.is_dir() {
            return ModuleContent::new(local);
        }

        if !self.download_external_modules {
            tracing::debug!(
                "external module {}:{} skipped, downloads disabled",
                source,
                version
            );
            return ModuleContent::absent();
        }

        // A fetcher may already have materialized the module.
        let external_root = root_dir.join(&self.external_modules_folder_name);
        let versioned = external_root.join(source).join(version);
        if versioned.is_dir() {
            return ModuleContent::new(versioned);
        }
        let unversioned = external_root.join(source);
        if unversioned.is_dir() {
            return ModuleContent::new(unversioned);
        }

        tracing::debug!("no content found for {}:{}", source, version);
        ModuleContent::absent()
    }
}

impl ModuleLoader for LocalPathLoader {
    fn load(&mut self, root_dir: &Path, source: &str, version: &str) -> ModuleContent {
        let cache_key = format!("{}:{}", source, version);
        if let Some(cached) = self.content_cache.get(&cache_key) {
            return cached.clone();
        }
        let content = self.resolve(root_dir, source, version);
        self.content_cache.insert(cache_key, content.clone());
        content
    }
}
