//! Error types for deps-filter

/// Result type for deps-filter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or applying copy rules
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Destination '{destination}' is written by both {first} and {second}")]
    Conflict {
        destination: String,
        first: String,
        second: String,
    },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Renaming '{path}' produced invalid path '{renamed}': {reason}")]
    InvalidRename {
        path: String,
        renamed: String,
        reason: String,
    },

    #[error("Invalid copy rules: {0}")]
    Config(String),

    #[error(transparent)]
    Fs(#[from] deps_fs::Error),
}

impl Error {
    pub(crate) fn invalid_pattern(pattern: &str, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
    }
}
