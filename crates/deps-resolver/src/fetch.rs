//! Injected fetch capabilities
//!
//! Strategies never talk to the network or a VCS directly. They call a
//! [`Fetcher`] (local directories, repositories) or a [`RegistryClient`]
//! (registries) and receive raw entries back.

use std::fmt;

use async_trait::async_trait;
use deps_tree::FileKind;

/// Category of a fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The identifier does not exist at the source.
    NotFound,
    /// No available version satisfies the constraint.
    NoMatchingVersion,
    /// The constraint or ref cannot be interpreted.
    InvalidReference,
    /// Transport or I/O failure.
    Transport,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::NotFound => write!(f, "not found"),
            FetchErrorKind::NoMatchingVersion => write!(f, "no matching version"),
            FetchErrorKind::InvalidReference => write!(f, "invalid reference"),
            FetchErrorKind::Transport => write!(f, "transport error"),
        }
    }
}

/// A failure reported by a fetch capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transport, message)
    }
}

/// One raw entry returned by a fetch, before path validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedEntry {
    pub path: String,
    pub kind: FileKind,
    /// File bytes for files, UTF-8 target for symlinks, `None` for directories.
    pub content: Option<Vec<u8>>,
}

impl FetchedEntry {
    pub fn file(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::File,
            content: Some(content.into()),
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::Directory,
            content: None,
        }
    }

    pub fn symlink(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::Symlink,
            content: Some(target.into().into_bytes()),
        }
    }
}

/// The full listing of a fetched source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedSource {
    pub entries: Vec<FetchedEntry>,
}

impl FetchedSource {
    pub fn new(entries: Vec<FetchedEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<FetchedEntry> for FetchedSource {
    fn from_iter<I: IntoIterator<Item = FetchedEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Fetch capability for path- and ref-addressed sources.
///
/// Retries and cancellation of in-flight transfers belong to the
/// implementation, not to the resolver.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Turn a constraint (ref, tag, path marker) into the concrete version
    /// that [`Fetcher::fetch`] will deliver.
    async fn resolve_version(&self, identifier: &str, constraint: &str) -> Result<String, FetchError>;

    /// Fetch every entry of `identifier` at a resolved version.
    async fn fetch(&self, identifier: &str, version: &str) -> Result<FetchedSource, FetchError>;
}

/// Fetch capability for name-addressed registries.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// All published versions of a package.
    async fn versions(&self, name: &str) -> Result<Vec<String>, FetchError>;

    /// Download one published version.
    async fn download(&self, name: &str, version: &str) -> Result<FetchedSource, FetchError>;
}
