//! Error types for deps-tree

/// Result type for deps-tree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Tree-structure violations.
///
/// All variants carry plain strings so the error can be cloned and handed
/// to every requester waiting on the same resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Duplicate path '{path}' in tree for {spec}")]
    DuplicatePath { path: String, spec: String },

    #[error("Attaching {child} under {parent} would create a dependency cycle")]
    CyclicDependency { parent: String, child: String },

    #[error("Nothing found at '{path}'")]
    NotFound { path: String },

    #[error("Invalid content for {kind} entry '{path}'")]
    InvalidContent { path: String, kind: String },

    #[error("Unknown source kind: {value}")]
    UnknownSourceKind { value: String },
}

impl From<deps_fs::Error> for Error {
    fn from(err: deps_fs::Error) -> Self {
        match err {
            deps_fs::Error::InvalidPath { path, reason } => Self::InvalidPath { path, reason },
            other => Self::InvalidPath {
                path: String::new(),
                reason: other.to_string(),
            },
        }
    }
}
