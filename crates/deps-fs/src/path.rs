//! Relative path handling for resolved entries
//!
//! Every entry in a resolved tree is addressed by a [`RelativePath`]: forward
//! slashes only, no empty or `.` segments, and never a `..` segment or an
//! absolute root. Paths are converted to platform-native form only at the
//! materialization boundary.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A validated, slash-normalized relative path.
///
/// Backslashes are converted to forward slashes, `.` and empty segments are
/// dropped, and trailing slashes are removed. Construction fails for empty
/// paths, absolute paths, drive-prefixed paths and paths containing `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath {
    inner: String,
}

impl RelativePath {
    /// Validate and normalize a relative path.
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let raw = path.as_ref();
        let slashed = raw.replace('\\', "/");

        if slashed.starts_with('/') {
            return Err(Error::invalid_path(raw, "path is absolute"));
        }
        if has_drive_prefix(&slashed) {
            return Err(Error::invalid_path(raw, "path has a drive prefix"));
        }

        let mut segments = Vec::new();
        for segment in slashed.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(Error::invalid_path(raw, "path contains '..'")),
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Err(Error::invalid_path(raw, "path is empty"));
        }

        Ok(Self {
            inner: segments.join("/"),
        })
    }

    /// Get the normalized string representation.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Iterate over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.inner.split('/')
    }

    /// Number of segments in the path.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Join a relative segment onto this path.
    pub fn join(&self, segment: &str) -> Result<Self> {
        Self::new(format!("{}/{}", self.inner, segment))
    }

    /// Get the parent directory, or `None` for a single-segment path.
    pub fn parent(&self) -> Option<Self> {
        self.inner.rfind('/').map(|idx| Self {
            inner: self.inner[..idx].to_string(),
        })
    }

    /// Get the last segment.
    pub fn file_name(&self) -> &str {
        self.inner.rsplit('/').next().unwrap_or(&self.inner)
    }

    /// Get the extension of the last segment if present.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// Whether `prefix` is this path or one of its ancestors, compared by
    /// whole segments (`a/bc` does not start with `a/b`).
    pub fn starts_with(&self, prefix: &RelativePath) -> bool {
        self.inner == prefix.inner
            || (self.inner.starts_with(&prefix.inner)
                && self.inner.as_bytes().get(prefix.inner.len()) == Some(&b'/'))
    }

    /// Strip an ancestor prefix, returning the remainder.
    ///
    /// Returns `None` when `prefix` is not a strict ancestor of this path.
    pub fn strip_prefix(&self, prefix: &RelativePath) -> Option<Self> {
        if self.inner.len() > prefix.inner.len() && self.starts_with(prefix) {
            Some(Self {
                inner: self.inner[prefix.inner.len() + 1..].to_string(),
            })
        } else {
            None
        }
    }

    /// Convert to a platform-native `PathBuf` for I/O operations.
    pub fn to_native(&self) -> PathBuf {
        self.segments().collect()
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl TryFrom<String> for RelativePath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for RelativePath {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.inner
    }
}
