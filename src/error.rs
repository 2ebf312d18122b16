use thiserror::Error;

/// Per-file parse failure captured in the parsing-errors sink.
///
/// The loader never propagates these; the offending file's contribution is
/// simply omitted and traversal continues.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid HCL in {path}: {message}")]
    Hcl { path: String, message: String },

    #[error("invalid JSON in {path}: {message}")]
    Json { path: String, message: String },
}

impl ParseError {
    pub fn path(&self) -> &str {
        match self {
            ParseError::Io { path, .. }
            | ParseError::Hcl { path, .. }
            | ParseError::Json { path, .. } => path,
        }
    }
}
