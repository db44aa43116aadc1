//! Durable backing for [`DependenciesCache`](crate::DependenciesCache)
//!
//! One JSON document per cache key, named after the SHA-256 of the key and
//! written atomically under an advisory lock. A record holds the tree's own
//! entries and the specs of its children; children are stored under their
//! own keys and resolved again on reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use deps_fs::io::{read_locked, write_atomic};
use deps_tree::{DependencySpec, FileKind, FileStruct, Tree};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::CacheKey;

/// Bumped whenever the record layout changes; other versions are ignored.
pub const STORE_FORMAT: u32 = 2;

/// One persisted cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub format: u32,
    pub key: CacheKey,
    /// Constraint of the spec that first produced the entry.
    pub constraint: String,
    pub stored_at: DateTime<Utc>,
    pub tree: PersistedTree,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTree {
    pub spec: DependencySpec,
    pub resolved_version: String,
    pub entries: Vec<PersistedEntry>,
    /// Specs of the child trees, in attachment order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencySpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub path: String,
    pub kind: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
}

impl PersistedTree {
    pub fn from_tree(tree: &Tree) -> Self {
        Self {
            spec: tree.spec().clone(),
            resolved_version: tree.resolved_version().to_string(),
            entries: tree
                .entries()
                .iter()
                .map(|entry| PersistedEntry {
                    path: entry.path().to_string(),
                    kind: entry.kind(),
                    content: match entry.kind() {
                        FileKind::File => entry.content().map(<[u8]>::to_vec),
                        FileKind::Symlink => entry.link_target().map(|t| t.as_bytes().to_vec()),
                        FileKind::Directory => None,
                    },
                })
                .collect(),
            dependencies: tree.children().map(|(spec, _)| spec.clone()).collect(),
        }
    }

    /// Rebuild the tree's own entries, re-validating every path.
    ///
    /// The returned tree has no children; the caller resolves the returned
    /// dependency specs and attaches them.
    pub fn into_parts(self) -> std::result::Result<(Tree, Vec<DependencySpec>), deps_tree::Error> {
        let spec = Arc::new(self.spec);
        let mut tree = Tree::new(spec.clone(), self.resolved_version);
        for entry in self.entries {
            tree.add_entry(FileStruct::new(&entry.path, entry.kind, entry.content, spec.clone())?)?;
        }
        Ok((tree, self.dependencies))
    }
}

/// Directory-backed store of resolved trees.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Use `root` as the store directory. It is created on first write.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.json", key.file_stem()))
    }

    pub fn save(&self, key: &CacheKey, constraint: &str, tree: &Tree) -> Result<()> {
        let path = self.path_for(key);
        let record = PersistedRecord {
            format: STORE_FORMAT,
            key: key.clone(),
            constraint: constraint.to_string(),
            stored_at: Utc::now(),
            tree: PersistedTree::from_tree(tree),
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| Error::store(&path, e))?;
        write_atomic(&path, &bytes).map_err(|e| Error::store(&path, e))?;
        tracing::debug!(%key, path = %path.display(), "Persisted cache entry");
        Ok(())
    }

    /// Load the record for `key`.
    ///
    /// Returns `Ok(None)` when nothing is stored, when the record was written
    /// by another format version, or when the file belongs to another key.
    pub fn load(&self, key: &CacheKey) -> Result<Option<PersistedRecord>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = read_locked(&path).map_err(|e| Error::store(&path, e))?;
        let record: PersistedRecord =
            serde_json::from_slice(&bytes).map_err(|e| Error::store(&path, e))?;

        if record.format != STORE_FORMAT {
            tracing::warn!(%key, format = record.format, "Ignoring cache entry with unknown format");
            return Ok(None);
        }
        if record.key != *key {
            tracing::warn!(%key, stored = %record.key, "Ignoring cache entry stored for another key");
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Delete the record for `key`. Returns whether a record existed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::store(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::VersionKey;
    use deps_tree::SourceKind;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn key(version: &str) -> CacheKey {
        CacheKey::new(SourceKind::Registry, "pkg", VersionKey::Resolved(version.into()))
    }

    fn sample_tree() -> Tree {
        let spec = Arc::new(DependencySpec::registry("pkg", "^1.0"));
        let mut tree = Tree::new(spec.clone(), "1.2.3");
        tree.add_entry(FileStruct::directory("src", spec.clone()).unwrap())
            .unwrap();
        tree.add_entry(FileStruct::file("src/lib.txt", b"hello".to_vec(), spec.clone()).unwrap())
            .unwrap();
        tree.add_entry(FileStruct::symlink("current", "src", spec).unwrap())
            .unwrap();

        let child_spec = Arc::new(DependencySpec::registry("dep", "1.x"));
        let mut child = Tree::new(child_spec.clone(), "1.0.0");
        child
            .add_entry(FileStruct::file("dep.txt", b"dep".to_vec(), child_spec).unwrap())
            .unwrap();
        tree.add_child(DependencySpec::registry("dep", "1.x"), Arc::new(child))
            .unwrap();
        tree
    }

    #[test]
    fn save_then_load_keeps_entries_and_child_specs() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path().join("cache"));
        let tree = sample_tree();

        store.save(&key("1.2.3"), "^1.0", &tree).unwrap();
        let record = store.load(&key("1.2.3")).unwrap().unwrap();
        assert_eq!(record.constraint, "^1.0");

        let (rebuilt, dependencies) = record.tree.into_parts().unwrap();
        assert_eq!(rebuilt.resolved_version(), "1.2.3");
        assert_eq!(rebuilt.entries(), tree.entries());
        assert_eq!(
            rebuilt.find("current").unwrap().as_file().unwrap().link_target(),
            Some("src")
        );
        assert_eq!(rebuilt.children().count(), 0);
        assert_eq!(dependencies, vec![DependencySpec::registry("dep", "1.x")]);
    }

    #[test]
    fn child_contents_are_not_written_into_the_parent_record() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path());
        store.save(&key("1.2.3"), "^1.0", &sample_tree()).unwrap();

        let raw = std::fs::read_to_string(store.path_for(&key("1.2.3"))).unwrap();
        assert!(raw.contains("src/lib.txt"));
        assert!(!raw.contains("dep.txt"));
    }

    #[test]
    fn missing_record_is_none() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path());
        assert!(store.load(&key("1.0.0")).unwrap().is_none());
        assert!(!store.remove(&key("1.0.0")).unwrap());
    }

    #[test]
    fn record_for_another_key_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path());
        store.save(&key("1.0.0"), "*", &sample_tree()).unwrap();
        std::fs::rename(store.path_for(&key("1.0.0")), store.path_for(&key("2.0.0"))).unwrap();

        assert!(store.load(&key("2.0.0")).unwrap().is_none());
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path());
        std::fs::write(store.path_for(&key("1.0.0")), b"{not json").unwrap();

        assert!(matches!(store.load(&key("1.0.0")), Err(Error::Store { .. })));
    }

    #[test]
    fn remove_deletes_record() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path());
        store.save(&key("1.0.0"), "*", &sample_tree()).unwrap();

        assert!(store.remove(&key("1.0.0")).unwrap());
        assert!(store.load(&key("1.0.0")).unwrap().is_none());
    }
}
