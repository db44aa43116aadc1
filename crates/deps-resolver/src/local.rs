//! Local directory dependencies

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use deps_tree::{DependencySpec, SourceKind};
use walkdir::WalkDir;

use crate::fetch::{FetchError, FetchErrorKind, FetchedEntry, FetchedSource, Fetcher};
use crate::resolver::{FetchStrategy, Selection};

/// Strategy for [`SourceKind::LocalPath`] specs.
///
/// Local trees are keyed by the directory the fetcher resolves the path to
/// and are never written to a cache store, since their contents can change
/// without a version change.
pub struct LocalStrategy {
    fetcher: Arc<dyn Fetcher>,
}

impl LocalStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl FetchStrategy for LocalStrategy {
    fn name(&self) -> &str {
        "local"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::LocalPath
    }

    fn identifier(&self, spec: &DependencySpec) -> String {
        normalize_local_path(spec.location())
    }

    async fn select(&self, spec: &DependencySpec, identifier: &str) -> Result<Selection, FetchError> {
        let resolved = self
            .fetcher
            .resolve_version(identifier, spec.constraint())
            .await?;
        Ok(Selection::hashed(resolved))
    }

    fn accepts(&self, _spec: &DependencySpec, _resolved_version: &str) -> bool {
        true
    }

    fn persistable(&self) -> bool {
        false
    }

    async fn fetch(
        &self,
        _spec: &DependencySpec,
        identifier: &str,
        selection: &Selection,
    ) -> Result<FetchedSource, FetchError> {
        self.fetcher.fetch(identifier, &selection.version).await
    }
}

/// Lexically normalize a local path: slashes only, no `.` segments, `..`
/// folded into preceding segments where possible, no trailing slash.
///
/// - `"./vendor//a/"` -> `"vendor/a"`
/// - `"a/b/../c"` -> `"a/c"`
/// - `"../shared"` -> `"../shared"`
/// - `"/opt/deps/./x"` -> `"/opt/deps/x"`
pub fn normalize_local_path(location: &str) -> String {
    let unified = location.replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Reads dependencies from directories on disk.
///
/// Relative identifiers are resolved against `base`. The resolved version of
/// a directory is its canonical path.
#[derive(Debug, Clone)]
pub struct LocalDirFetcher {
    base: PathBuf,
}

impl LocalDirFetcher {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn locate(&self, identifier: &str) -> PathBuf {
        let path = Path::new(identifier);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

#[async_trait]
impl Fetcher for LocalDirFetcher {
    async fn resolve_version(&self, identifier: &str, _constraint: &str) -> Result<String, FetchError> {
        let path = self.locate(identifier);
        let canonical = std::fs::canonicalize(&path).map_err(|e| {
            FetchError::not_found(format!("{}: {e}", path.display()))
        })?;
        if !canonical.is_dir() {
            return Err(FetchError::new(
                FetchErrorKind::InvalidReference,
                format!("{} is not a directory", canonical.display()),
            ));
        }
        Ok(canonical.to_string_lossy().into_owned())
    }

    async fn fetch(&self, identifier: &str, version: &str) -> Result<FetchedSource, FetchError> {
        let root = if version.is_empty() {
            self.locate(identifier)
        } else {
            PathBuf::from(version)
        };

        tokio::task::spawn_blocking(move || read_directory(&root))
            .await
            .map_err(|e| FetchError::transport(format!("directory read task failed: {e}")))?
    }
}

fn read_directory(root: &Path) -> Result<FetchedSource, FetchError> {
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| FetchError::transport(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| FetchError::transport(e.to_string()))?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let file_type = entry.file_type();
        let fetched = if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())
                .map_err(|e| FetchError::transport(format!("{}: {e}", entry.path().display())))?;
            FetchedEntry::symlink(path, target.to_string_lossy().replace('\\', "/"))
        } else if file_type.is_dir() {
            FetchedEntry::directory(path)
        } else {
            let content = std::fs::read(entry.path())
                .map_err(|e| FetchError::transport(format!("{}: {e}", entry.path().display())))?;
            FetchedEntry::file(path, content)
        };
        entries.push(fetched);
    }

    tracing::debug!(root = %root.display(), entries = entries.len(), "Read local directory");
    Ok(FetchedSource::new(entries))
}
