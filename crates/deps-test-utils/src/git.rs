//! Real git repositories for `GitFetcher` tests.

use std::fs;
use std::path::Path;

use git2::{Oid, Repository, Signature};

/// Initialises a repository at `path` and commits `files` on top of `HEAD`.
///
/// # Panics
/// Panics if any git or filesystem operation fails.
pub fn git_repo_with_files(path: &Path, files: &[(&str, &str)]) -> (Repository, Oid) {
    let repo = Repository::init(path).unwrap_or_else(|e| {
        panic!(
            "git_repo_with_files: failed to init repository at {}: {e}",
            path.display()
        )
    });
    let oid = commit_files(&repo, files, "Initial commit");
    (repo, oid)
}

/// Writes `files` into the work tree and commits them on `HEAD`.
///
/// # Panics
/// Panics if any git or filesystem operation fails.
pub fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str) -> Oid {
    let workdir = repo
        .workdir()
        .unwrap_or_else(|| panic!("commit_files: repository has no work tree"));

    let mut index = repo
        .index()
        .unwrap_or_else(|e| panic!("commit_files: failed to open index: {e}"));
    for (rel, content) in files {
        let full = workdir.join(rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("commit_files: failed to create {}: {e}", parent.display()));
        }
        fs::write(&full, content)
            .unwrap_or_else(|e| panic!("commit_files: failed to write {}: {e}", full.display()));
        index
            .add_path(Path::new(rel))
            .unwrap_or_else(|e| panic!("commit_files: failed to stage {rel}: {e}"));
    }
    index
        .write()
        .unwrap_or_else(|e| panic!("commit_files: failed to write index: {e}"));

    let tree_id = index
        .write_tree()
        .unwrap_or_else(|e| panic!("commit_files: failed to write tree: {e}"));
    let tree = repo
        .find_tree(tree_id)
        .unwrap_or_else(|e| panic!("commit_files: failed to find tree: {e}"));
    let signature = Signature::now("Test User", "test@test.com")
        .unwrap_or_else(|e| panic!("commit_files: failed to build signature: {e}"));

    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap_or_else(|e| panic!("commit_files: failed to commit: {e}"))
}

/// Creates a lightweight tag `name` pointing at `target`.
///
/// # Panics
/// Panics if the tag cannot be created.
pub fn tag(repo: &Repository, name: &str, target: Oid) {
    let object = repo
        .find_object(target, None)
        .unwrap_or_else(|e| panic!("tag: failed to find {target}: {e}"));
    repo.tag_lightweight(name, &object, false)
        .unwrap_or_else(|e| panic!("tag: failed to create {name}: {e}"));
}
