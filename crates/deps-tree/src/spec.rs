//! Dependency specifications

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Where a dependency is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// A directory on the local filesystem.
    LocalPath,
    /// A version-controlled repository addressed by URL.
    VersionControl,
    /// A package published to a registry under a name.
    Registry,
}

impl SourceKind {
    /// Short name used in configuration and log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::LocalPath => "local",
            SourceKind::VersionControl => "git",
            SourceKind::Registry => "registry",
        }
    }
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "path" | "local-path" => Ok(SourceKind::LocalPath),
            "git" | "vcs" | "version-control" => Ok(SourceKind::VersionControl),
            "registry" => Ok(SourceKind::Registry),
            _ => Err(Error::UnknownSourceKind {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request for one dependency.
///
/// `location` is what the fetch capability is asked for: a filesystem path
/// for local specs, a repository URL for version-control specs and the
/// package name for registry specs. `constraint` is a version range for
/// registry specs and a ref for version-control specs. Specs are immutable
/// once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencySpec {
    name: String,
    kind: SourceKind,
    location: String,
    constraint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subpath: Option<String>,
}

/// Constraint recorded for local specs, which carry no version.
pub const ANY_VERSION: &str = "*";

/// Ref used for version-control specs that do not name one.
pub const DEFAULT_REF: &str = "HEAD";

impl DependencySpec {
    pub fn new(
        name: impl Into<String>,
        kind: SourceKind,
        location: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            location: location.into(),
            constraint: constraint.into(),
            subpath: None,
        }
    }

    /// A dependency on a local directory.
    pub fn local(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, SourceKind::LocalPath, path, ANY_VERSION)
    }

    /// A dependency on a repository at a ref (branch, tag or commit).
    pub fn git(name: impl Into<String>, url: impl Into<String>, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        let reference = if reference.trim().is_empty() {
            DEFAULT_REF.to_string()
        } else {
            reference
        };
        Self::new(name, SourceKind::VersionControl, url, reference)
    }

    /// A dependency on a registry package within a version range.
    pub fn registry(name: impl Into<String>, constraint: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), SourceKind::Registry, name, constraint)
    }

    /// Restrict the dependency to one subdirectory of the fetched source.
    pub fn with_subpath(mut self, subpath: impl Into<String>) -> Self {
        let subpath = subpath.into();
        let trimmed = subpath.trim_matches('/');
        self.subpath = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn constraint(&self) -> &str {
        &self.constraint
    }

    pub fn subpath(&self) -> Option<&str> {
        self.subpath.as_deref()
    }

    /// Re-anchor a relative local spec declared inside `parent`.
    ///
    /// A local path in a local dependency's manifest is relative to that
    /// dependency's directory. Other specs are returned unchanged.
    pub fn relative_to(&self, parent: &DependencySpec) -> DependencySpec {
        if self.kind != SourceKind::LocalPath
            || parent.kind != SourceKind::LocalPath
            || is_absolute_location(&self.location)
        {
            return self.clone();
        }

        let mut base = parent.location.trim_end_matches(['/', '\\']).to_string();
        if let Some(sub) = &parent.subpath {
            base = format!("{base}/{sub}");
        }

        let mut rebased = self.clone();
        rebased.location = format!("{base}/{}", self.location);
        rebased
    }
}

fn is_absolute_location(location: &str) -> bool {
    let bytes = location.as_bytes();
    location.starts_with('/')
        || location.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.constraint)
    }
}
