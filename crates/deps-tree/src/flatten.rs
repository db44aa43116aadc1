//! Lazy depth-first flattening of a tree hierarchy

use std::collections::HashSet;
use std::slice;

use deps_fs::RelativePath;

use crate::file::FileStruct;
use crate::tree::{Tree, TreeId};

/// Iterator returned by [`Tree::flatten`].
///
/// Yields `(path, entry)` pairs. A path is produced at most once; the first
/// tree visited that owns it wins. Trees shared between several parents are
/// walked only once.
pub struct Flatten<'a> {
    pending: Vec<&'a Tree>,
    current: Option<slice::Iter<'a, FileStruct>>,
    seen_paths: HashSet<&'a RelativePath>,
    seen_trees: HashSet<TreeId>,
}

impl<'a> Flatten<'a> {
    pub(crate) fn new(root: &'a Tree) -> Self {
        Self {
            pending: vec![root],
            current: None,
            seen_paths: HashSet::new(),
            seen_trees: HashSet::new(),
        }
    }
}

impl<'a> Iterator for Flatten<'a> {
    type Item = (&'a RelativePath, &'a FileStruct);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entries) = self.current.as_mut() {
                for entry in entries.by_ref() {
                    if self.seen_paths.insert(entry.path()) {
                        return Some((entry.path(), entry));
                    }
                    tracing::trace!(path = %entry.path(), origin = %entry.origin(), "Shadowed by shallower entry");
                }
                self.current = None;
            }

            let tree = self.pending.pop()?;
            if !self.seen_trees.insert(tree.id()) {
                continue;
            }

            // Reverse so the first child is visited first
            let children: Vec<&'a Tree> = tree.children().map(|(_, child)| child.as_ref()).collect();
            self.pending.extend(children.into_iter().rev());
            self.current = Some(tree.entries().iter());
        }
    }
}
