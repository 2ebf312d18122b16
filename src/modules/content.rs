use std::path::{Path, PathBuf};

/// Result of a module load attempt: either a directory on disk holding the
/// module's configuration, or nothing.
#[derive(Debug, Clone, Default)]
pub struct ModuleContent {
    path: Option<PathBuf>,
}

impl ModuleContent {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub fn absent() -> Self {
        Self { path: None }
    }

    pub fn loaded(&self) -> bool {
        self.path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
