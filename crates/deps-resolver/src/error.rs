//! Error types for deps-resolver

use std::fmt;
use std::path::PathBuf;

use deps_tree::DependencySpec;

use crate::fetch::FetchError;
use crate::key::CacheKey;

/// Result type for deps-resolver operations
pub type Result<T> = std::result::Result<T, Error>;

/// The specs leading from a top-level request down to a failing one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecChain(Vec<DependencySpec>);

impl SpecChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this chain extended by `spec`.
    pub fn with(&self, spec: &DependencySpec) -> Self {
        let mut specs = self.0.clone();
        specs.push(spec.clone());
        Self(specs)
    }

    pub fn specs(&self) -> &[DependencySpec] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SpecChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, spec) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{spec}")?;
        }
        Ok(())
    }
}

/// Errors that can occur while resolving dependencies.
///
/// Errors are `Clone`: one failed resolution is delivered to every
/// requester that was waiting on the same cache key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("Failed to fetch {spec} (via {chain}): {source}")]
    Resolution {
        spec: DependencySpec,
        chain: SpecChain,
        #[source]
        source: FetchError,
    },

    #[error("Invalid manifest in {spec} (via {chain}): {message}")]
    Manifest {
        spec: DependencySpec,
        chain: SpecChain,
        message: String,
    },

    #[error("No resolver accepts {spec} (via {chain})")]
    Unresolvable {
        spec: DependencySpec,
        chain: SpecChain,
    },

    #[error("Dependency cycle detected at {spec}: {chain}")]
    CyclicDependency {
        spec: DependencySpec,
        chain: SpecChain,
    },

    #[error("Invalid tree for {spec} (via {chain}): {source}")]
    Tree {
        spec: DependencySpec,
        chain: SpecChain,
        #[source]
        source: deps_tree::Error,
    },

    #[error("Invalid version constraint '{constraint}': {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    /// Returned by the cache when waiting on `key` would wait on itself;
    /// resolvers report it as `CyclicDependency`.
    #[error("Waiting on {key} would deadlock")]
    WaitCycle { key: CacheKey },

    #[error("Cache entry {key} is still resolving")]
    CachePending { key: CacheKey },

    #[error("Cache store error at {path}: {message}")]
    Store { path: PathBuf, message: String },

    #[error("Invalid resolver configuration: {message}")]
    Config { message: String },
}

impl Error {
    /// The spec whose resolution failed, if the error belongs to one.
    pub fn spec(&self) -> Option<&DependencySpec> {
        match self {
            Error::Resolution { spec, .. }
            | Error::Manifest { spec, .. }
            | Error::Unresolvable { spec, .. }
            | Error::CyclicDependency { spec, .. }
            | Error::Tree { spec, .. } => Some(spec),
            _ => None,
        }
    }

    /// The request chain that led to the failing spec.
    pub fn chain(&self) -> Option<&SpecChain> {
        match self {
            Error::Resolution { chain, .. }
            | Error::Manifest { chain, .. }
            | Error::Unresolvable { chain, .. }
            | Error::CyclicDependency { chain, .. }
            | Error::Tree { chain, .. } => Some(chain),
            _ => None,
        }
    }

    pub(crate) fn store(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Store {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
