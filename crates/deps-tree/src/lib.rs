//! Resolved dependency data model.
//!
//! A [`DependencySpec`] names a wanted dependency. Resolving it yields a
//! [`Tree`]: the dependency's own [`FileStruct`] entries plus child trees for
//! its transitive dependencies. [`Tree::flatten`] merges the whole hierarchy
//! into one path namespace where shallower entries shadow deeper ones.

pub mod error;
pub mod file;
pub mod flatten;
pub mod spec;
pub mod tree;

pub use deps_fs::RelativePath;
pub use error::{Error, Result};
pub use file::{FileKind, FileStruct};
pub use flatten::Flatten;
pub use spec::{DependencySpec, SourceKind};
pub use tree::{Node, Tree, TreeId};
