//! Normalized cache identity

use std::fmt;

use deps_fs::checksum::hex_digest;
use deps_tree::SourceKind;
use serde::{Deserialize, Serialize};

/// The version half of a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum VersionKey {
    /// A concrete version or commit id that was selected before fetching.
    Resolved(String),
    /// A digest standing in for sources that have no version, such as local
    /// directories.
    ConstraintHash(String),
}

impl VersionKey {
    pub fn as_str(&self) -> &str {
        match self {
            VersionKey::Resolved(v) | VersionKey::ConstraintHash(v) => v,
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionKey::Resolved(v) => f.write_str(v),
            VersionKey::ConstraintHash(h) => {
                let short: String = h.chars().take(12).collect();
                write!(f, "#{short}")
            }
        }
    }
}

/// Identity of one resolution: two specs that would fetch identical bytes
/// produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub kind: SourceKind,
    pub identifier: String,
    pub version: VersionKey,
}

impl CacheKey {
    pub fn new(kind: SourceKind, identifier: impl Into<String>, version: VersionKey) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            version,
        }
    }

    /// Stable file stem for the persisted form of this key.
    pub fn file_stem(&self) -> String {
        hex_digest(self.to_string().as_bytes())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.kind, self.identifier, self.version)
    }
}
