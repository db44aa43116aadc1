//! Resolved dependency trees

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use deps_fs::RelativePath;

use crate::file::FileStruct;
use crate::flatten::Flatten;
use crate::spec::DependencySpec;
use crate::{Error, Result};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable handle identifying a tree.
///
/// Assigned once at construction and preserved by `Clone`, so a cloned
/// snapshot is still recognised as the same tree by cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u64);

impl TreeId {
    fn next() -> Self {
        Self(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Result of a [`Tree::find`] lookup.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    File(&'a FileStruct),
    Tree(&'a Arc<Tree>),
}

impl<'a> Node<'a> {
    pub fn as_file(&self) -> Option<&'a FileStruct> {
        match self {
            Node::File(file) => Some(file),
            Node::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&'a Arc<Tree>> {
        match self {
            Node::Tree(tree) => Some(tree),
            Node::File(_) => None,
        }
    }
}

/// One resolved dependency and its transitive dependencies.
///
/// Entries keep discovery order and never share a path. Children are keyed
/// by the spec that requested them and shared by `Arc`: once a tree is
/// attached or cached it is read-only.
#[derive(Debug, Clone)]
pub struct Tree {
    id: TreeId,
    spec: Arc<DependencySpec>,
    resolved_version: String,
    entries: Vec<FileStruct>,
    index: HashMap<RelativePath, usize>,
    children: Vec<(DependencySpec, Arc<Tree>)>,
}

impl Tree {
    pub fn new(spec: impl Into<Arc<DependencySpec>>, resolved_version: impl Into<String>) -> Self {
        Self {
            id: TreeId::next(),
            spec: spec.into(),
            resolved_version: resolved_version.into(),
            entries: Vec::new(),
            index: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    /// The spec that produced this tree.
    pub fn spec(&self) -> &DependencySpec {
        &self.spec
    }

    pub fn spec_arc(&self) -> &Arc<DependencySpec> {
        &self.spec
    }

    /// The concrete version or ref actually fetched.
    pub fn resolved_version(&self) -> &str {
        &self.resolved_version
    }

    /// This tree's own entries in discovery order.
    pub fn entries(&self) -> &[FileStruct] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Direct children in attachment order.
    pub fn children(&self) -> impl Iterator<Item = (&DependencySpec, &Arc<Tree>)> {
        self.children.iter().map(|(spec, tree)| (spec, tree))
    }

    pub fn child(&self, spec: &DependencySpec) -> Option<&Arc<Tree>> {
        self.children
            .iter()
            .find(|(s, _)| s == spec)
            .map(|(_, tree)| tree)
    }

    pub fn child_by_name(&self, name: &str) -> Option<&Arc<Tree>> {
        self.children
            .iter()
            .find(|(s, _)| s.name() == name)
            .map(|(_, tree)| tree)
    }

    /// Add an entry to this tree.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicatePath` if this tree already owns an entry at
    /// the same path. Paths shared with children are allowed and resolved by
    /// [`Tree::flatten`].
    pub fn add_entry(&mut self, entry: FileStruct) -> Result<()> {
        if self.index.contains_key(entry.path()) {
            return Err(Error::DuplicatePath {
                path: entry.path().to_string(),
                spec: self.spec.to_string(),
            });
        }
        self.index.insert(entry.path().clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Attach a transitive dependency.
    ///
    /// Attaching under a spec that is already present replaces the previous
    /// child.
    ///
    /// # Errors
    ///
    /// Returns `Error::CyclicDependency` if `child` is this tree or already
    /// contains it, i.e. this tree is an ancestor of itself afterwards.
    pub fn add_child(&mut self, spec: DependencySpec, child: Arc<Tree>) -> Result<()> {
        if child.id == self.id || child.contains(self.id) {
            return Err(Error::CyclicDependency {
                parent: self.spec.to_string(),
                child: spec.to_string(),
            });
        }

        match self.children.iter_mut().find(|(s, _)| *s == spec) {
            Some(slot) => slot.1 = child,
            None => self.children.push((spec, child)),
        }
        Ok(())
    }

    /// Whether a tree with `id` appears anywhere below this one.
    pub fn contains(&self, id: TreeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack: Vec<&Tree> = self.children.iter().map(|(_, t)| t.as_ref()).collect();
        while let Some(tree) = stack.pop() {
            if tree.id == id {
                return true;
            }
            if visited.insert(tree.id) {
                stack.extend(tree.children.iter().map(|(_, t)| t.as_ref()));
            }
        }
        false
    }

    /// Lazily merge this tree and all descendants into one path namespace.
    ///
    /// Trees are visited depth-first, parent before children, children in
    /// attachment order. When two entries share a path the first one visited
    /// wins, so a shallower or earlier-declared dependency shadows the rest.
    pub fn flatten(&self) -> Flatten<'_> {
        Flatten::new(self)
    }

    /// Look up an entry or child tree by relative path.
    ///
    /// Paths resolve the way [`Tree::flatten`] merges them: the first tree
    /// in flatten order that owns the path wins. A path no tree owns is
    /// tried as `<child name>/<rest>`, addressing a child tree or an entry
    /// inside it.
    pub fn find(&self, path: &str) -> Result<Node<'_>> {
        let rel = RelativePath::new(path)?;
        self.find_relative(&rel).ok_or_else(|| Error::NotFound {
            path: rel.to_string(),
        })
    }

    fn find_relative(&self, rel: &RelativePath) -> Option<Node<'_>> {
        if let Some(&idx) = self.index.get(rel) {
            return Some(Node::File(&self.entries[idx]));
        }
        if let Some((_, entry)) = self.flatten().find(|(path, _)| *path == rel) {
            return Some(Node::File(entry));
        }

        let (head, rest) = match rel.as_str().split_once('/') {
            Some((head, rest)) => (head, Some(rest)),
            None => (rel.as_str(), None),
        };

        let child = self.child_by_name(head)?;
        match rest {
            None => Some(Node::Tree(child)),
            Some(rest) => {
                let rest = RelativePath::new(rest).ok()?;
                child.find_relative(&rest)
            }
        }
    }

    /// Number of distinct trees in this hierarchy, including this one.
    pub fn tree_count(&self) -> usize {
        let mut visited = HashSet::new();
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            if visited.insert(tree.id) {
                stack.extend(tree.children.iter().map(|(_, t)| t.as_ref()));
            }
        }
        visited.len()
    }
}
