//! Resolved file-system entries

use std::fmt;
use std::sync::Arc;

use deps_fs::{RelativePath, compute_checksum};
use serde::{Deserialize, Serialize};

use crate::spec::DependencySpec;
use crate::{Error, Result};

/// The type of a resolved entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::File => write!(f, "file"),
            FileKind::Directory => write!(f, "directory"),
            FileKind::Symlink => write!(f, "symlink"),
        }
    }
}

/// One resolved entry: a file with its bytes, a directory marker or a
/// symlink with its target.
///
/// Entries are immutable; [`FileStruct::with_path`] produces a relocated
/// copy. Equality compares path, kind, content checksum and link target,
/// never the origin.
#[derive(Debug, Clone)]
pub struct FileStruct {
    path: RelativePath,
    kind: FileKind,
    content: Option<Vec<u8>>,
    checksum: Option<String>,
    link_target: Option<String>,
    origin: Arc<DependencySpec>,
}

impl FileStruct {
    /// Build an entry of any kind.
    ///
    /// For files `content` is the file bytes (absent means empty). For
    /// symlinks `content` is the UTF-8 link target and is required.
    /// Directories carry no content.
    pub fn new(
        path: &str,
        kind: FileKind,
        content: Option<Vec<u8>>,
        origin: impl Into<Arc<DependencySpec>>,
    ) -> Result<Self> {
        match kind {
            FileKind::File => Self::file(path, content.unwrap_or_default(), origin),
            FileKind::Directory => {
                if content.is_some() {
                    return Err(Error::InvalidContent {
                        path: path.to_string(),
                        kind: kind.to_string(),
                    });
                }
                Self::directory(path, origin)
            }
            FileKind::Symlink => {
                let target = content
                    .and_then(|bytes| String::from_utf8(bytes).ok())
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| Error::InvalidContent {
                        path: path.to_string(),
                        kind: kind.to_string(),
                    })?;
                Self::symlink(path, target, origin)
            }
        }
    }

    pub fn file(
        path: &str,
        content: impl Into<Vec<u8>>,
        origin: impl Into<Arc<DependencySpec>>,
    ) -> Result<Self> {
        let content = content.into();
        Ok(Self {
            path: RelativePath::new(path)?,
            kind: FileKind::File,
            checksum: Some(compute_checksum(&content)),
            content: Some(content),
            link_target: None,
            origin: origin.into(),
        })
    }

    pub fn directory(path: &str, origin: impl Into<Arc<DependencySpec>>) -> Result<Self> {
        Ok(Self {
            path: RelativePath::new(path)?,
            kind: FileKind::Directory,
            content: None,
            checksum: None,
            link_target: None,
            origin: origin.into(),
        })
    }

    pub fn symlink(
        path: &str,
        target: impl Into<String>,
        origin: impl Into<Arc<DependencySpec>>,
    ) -> Result<Self> {
        Ok(Self {
            path: RelativePath::new(path)?,
            kind: FileKind::Symlink,
            content: None,
            checksum: None,
            link_target: Some(target.into()),
            origin: origin.into(),
        })
    }

    /// A copy of this entry at a different path.
    pub fn with_path(&self, path: &str) -> Result<Self> {
        Ok(Self {
            path: RelativePath::new(path)?,
            ..self.clone()
        })
    }

    pub fn path(&self) -> &RelativePath {
        &self.path
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// File bytes; `None` for directories and symlinks.
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// `sha256:<hex>` of the file bytes; `None` for non-files.
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn link_target(&self) -> Option<&str> {
        self.link_target.as_deref()
    }

    /// Size in bytes of the file content (zero for other kinds).
    pub fn size(&self) -> usize {
        self.content.as_ref().map_or(0, Vec::len)
    }

    /// The dependency that produced this entry.
    pub fn origin(&self) -> &DependencySpec {
        &self.origin
    }

    pub fn origin_arc(&self) -> &Arc<DependencySpec> {
        &self.origin
    }
}

impl PartialEq for FileStruct {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.kind == other.kind
            && self.checksum == other.checksum
            && self.link_target == other.link_target
    }
}

impl Eq for FileStruct {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn origin() -> Arc<DependencySpec> {
        Arc::new(DependencySpec::registry("pkg", "^1.0"))
    }

    #[test]
    fn file_records_checksum_and_origin() {
        let file = FileStruct::file("src/lib.rs", b"fn main() {}".to_vec(), origin()).unwrap();
        assert!(file.is_file());
        assert_eq!(file.size(), 12);
        assert!(file.checksum().unwrap().starts_with("sha256:"));
        assert_eq!(file.origin().name(), "pkg");
    }

    #[rstest]
    #[case("/abs/path")]
    #[case("")]
    #[case("a/../b")]
    fn invalid_paths_rejected(#[case] path: &str) {
        assert!(matches!(
            FileStruct::file(path, b"x".to_vec(), origin()),
            Err(Error::InvalidPath { .. })
        ));
    }

    #[test]
    fn equality_ignores_origin() {
        let a = FileStruct::file("a.txt", b"same".to_vec(), origin()).unwrap();
        let b = FileStruct::file(
            "a.txt",
            b"same".to_vec(),
            DependencySpec::local("other", "../other"),
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn equality_compares_content_and_kind() {
        let file = FileStruct::file("a", b"one".to_vec(), origin()).unwrap();
        let changed = FileStruct::file("a", b"two".to_vec(), origin()).unwrap();
        let dir = FileStruct::directory("a", origin()).unwrap();
        assert_ne!(file, changed);
        assert_ne!(file, dir);
    }

    #[test]
    fn with_path_produces_new_entry() {
        let file = FileStruct::file("a/b.txt", b"data".to_vec(), origin()).unwrap();
        let moved = file.with_path("c/b.txt").unwrap();
        assert_eq!(file.path().as_str(), "a/b.txt");
        assert_eq!(moved.path().as_str(), "c/b.txt");
        assert_eq!(moved.content(), file.content());
        assert!(file.with_path("../escape").is_err());
    }

    #[test]
    fn generic_constructor_validates_content_by_kind() {
        let dir = FileStruct::new("d", FileKind::Directory, Some(b"x".to_vec()), origin());
        assert!(matches!(dir, Err(Error::InvalidContent { .. })));

        let link = FileStruct::new("l", FileKind::Symlink, Some(b"target".to_vec()), origin())
            .unwrap();
        assert_eq!(link.link_target(), Some("target"));
        assert_eq!(link.content(), None);

        let missing = FileStruct::new("l", FileKind::Symlink, None, origin());
        assert!(missing.is_err());

        let empty = FileStruct::new("f", FileKind::File, None, origin()).unwrap();
        assert_eq!(empty.content(), Some(&[][..]));
    }
}
