//! Manifest discovery inside fetched dependencies.
//!
//! A dependency may carry a manifest file listing its own dependencies. The
//! default reader understands `deps.toml`:
//!
//! ```toml
//! [dependencies]
//! c = "1.x"                                           # registry
//! d = { path = "../d" }                               # local directory
//! e = { git = "https://host/e.git", ref = "v1", subpath = "lib" }
//! f = { version = "^2.0", subpath = "dist" }          # registry with subpath
//! g = { package = "real-name", version = "1" }        # registry under another name
//! ```

use std::collections::BTreeMap;

use deps_tree::{DependencySpec, SourceKind};
use serde::Deserialize;

/// Default manifest filename.
pub const MANIFEST_FILENAME: &str = "deps.toml";

/// Parses a dependency manifest into nested specs.
pub trait ManifestReader: Send + Sync {
    /// Name of the manifest file at the root of a fetched dependency.
    fn file_name(&self) -> &str;

    /// Parse manifest bytes. Errors are reported as plain messages and
    /// wrapped by the resolver together with the owning spec.
    fn parse(&self, bytes: &[u8]) -> Result<Vec<DependencySpec>, String>;
}

/// Reader for the TOML manifest format.
#[derive(Debug, Clone)]
pub struct TomlManifestReader {
    file_name: String,
}

impl TomlManifestReader {
    pub fn new() -> Self {
        Self::with_file_name(MANIFEST_FILENAME)
    }

    pub fn with_file_name(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl Default for TomlManifestReader {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    dependencies: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestEntry {
    Constraint(String),
    Detailed(DetailedEntry),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DetailedEntry {
    path: Option<String>,
    git: Option<String>,
    #[serde(rename = "ref")]
    reference: Option<String>,
    version: Option<String>,
    subpath: Option<String>,
    package: Option<String>,
}

impl DetailedEntry {
    fn into_spec(self, name: &str) -> Result<DependencySpec, String> {
        let spec = match (self.path, self.git) {
            (Some(_), Some(_)) => {
                return Err(format!("'{name}' sets both 'path' and 'git'"));
            }
            (Some(path), None) => {
                if self.version.is_some() || self.reference.is_some() {
                    return Err(format!("'{name}' is a path dependency and cannot set 'version' or 'ref'"));
                }
                DependencySpec::local(name, path)
            }
            (None, Some(url)) => {
                if self.version.is_some() {
                    return Err(format!("'{name}' is a git dependency; use 'ref' instead of 'version'"));
                }
                DependencySpec::git(name, url, self.reference.unwrap_or_default())
            }
            (None, None) => {
                if self.reference.is_some() {
                    return Err(format!("'{name}' sets 'ref' without 'git'"));
                }
                let package = self.package.unwrap_or_else(|| name.to_string());
                let constraint = self.version.unwrap_or_else(|| deps_tree::spec::ANY_VERSION.to_string());
                DependencySpec::new(name, SourceKind::Registry, package, constraint)
            }
        };

        Ok(match self.subpath {
            Some(subpath) => spec.with_subpath(subpath),
            None => spec,
        })
    }
}

impl ManifestReader for TomlManifestReader {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn parse(&self, bytes: &[u8]) -> Result<Vec<DependencySpec>, String> {
        let text = std::str::from_utf8(bytes).map_err(|e| format!("manifest is not UTF-8: {e}"))?;
        let manifest: ManifestFile = toml::from_str(text).map_err(|e| e.to_string())?;

        manifest
            .dependencies
            .into_iter()
            .map(|(name, entry)| match entry {
                ManifestEntry::Constraint(constraint) => Ok(DependencySpec::registry(name, constraint)),
                ManifestEntry::Detailed(detailed) => detailed.into_spec(&name),
            })
            .collect()
    }
}
