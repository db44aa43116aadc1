//! End-to-end: on-disk sources -> resolution -> copy rules -> output directory

use std::fs;
use std::path::Path;
use std::sync::Arc;

use deps_filter::{CopyDependenciesFilter, CopyRules, OnConflict, materialize};
use deps_resolver::local::normalize_local_path;
use deps_resolver::{
    BaseResolver, DependencySpec, LocalDirFetcher, LocalStrategy, MultiResolver, RegistryStrategy,
};
use deps_test_utils::{ManifestBuilder, MemoryRegistry, source};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// `vendor/a` is a local dependency that pulls `b` from the registry and
/// its sibling `vendor/shared` by relative path.
fn setup_workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "vendor/a/README.md", "# a");
    write(root, "vendor/a/a.txt", "from a");
    write(
        root,
        "vendor/a/deps.toml",
        &ManifestBuilder::new()
            .registry("b", "^1.0")
            .local("shared", "../shared")
            .build(),
    );
    write(root, "vendor/shared/shared/util.txt", "util");
    temp
}

fn registry() -> Arc<MemoryRegistry> {
    Arc::new(
        MemoryRegistry::new()
            .with_package("b", "1.4.0", source(&[("b/index.js", "b1"), ("b/README.md", "# b")]))
            .with_package("b", "2.0.0", source(&[("b/index.js", "b2")])),
    )
}

fn build_resolver(base: &Path, registry: Arc<MemoryRegistry>) -> MultiResolver {
    MultiResolver::new(vec![
        Box::new(BaseResolver::new(LocalStrategy::new(Arc::new(LocalDirFetcher::new(base))))),
        Box::new(BaseResolver::new(RegistryStrategy::new(registry))),
    ])
}

#[tokio::test]
async fn test_resolve_filter_and_materialize() {
    let workspace = setup_workspace();
    let resolver = build_resolver(workspace.path(), registry());

    let report = resolver
        .resolve_all(&[DependencySpec::local("a", "vendor/a")])
        .await;
    assert!(report.is_complete(), "failures: {:?}", report.failures);
    let root = report.root;

    let a = root.child_by_name("a").unwrap();
    let nested: Vec<&str> = a.children().map(|(spec, _)| spec.name()).collect();
    assert_eq!(nested, vec!["b", "shared"]);
    assert_eq!(a.child_by_name("b").unwrap().resolved_version(), "1.4.0");
    let shared = a.child_by_name("shared").unwrap();
    assert_eq!(normalize_local_path(shared.spec().location()), "vendor/shared");

    let rules = CopyRules::new().exclude("*.md").exclude("deps.toml");
    let instructions = CopyDependenciesFilter::new(&rules).unwrap().apply(&root).unwrap();
    let destinations: Vec<&str> = instructions.iter().map(|i| i.destination.as_str()).collect();
    assert_eq!(
        destinations,
        vec!["a.txt", "b/index.js", "shared", "shared/util.txt"]
    );

    let out = TempDir::new().unwrap();
    let written = materialize(&instructions, out.path()).unwrap();
    assert_eq!(written.files, 3);
    assert_eq!(written.directories, 1);
    assert_eq!(fs::read_to_string(out.path().join("b/index.js")).unwrap(), "b1");
    assert_eq!(fs::read_to_string(out.path().join("shared/util.txt")).unwrap(), "util");
    assert!(!out.path().join("README.md").exists());
}

#[tokio::test]
async fn test_top_level_entries_shadow_nested_ones() {
    let workspace = setup_workspace();
    write(workspace.path(), "app/b/index.js", "patched");
    write(
        workspace.path(),
        "app/deps.toml",
        &ManifestBuilder::new().registry("b", "1").build(),
    );
    let resolver = build_resolver(workspace.path(), registry());

    let root = resolver
        .resolve_spec(&DependencySpec::local("app", "app"))
        .await
        .unwrap();
    let instructions = CopyDependenciesFilter::new(&CopyRules::new().include("b/*"))
        .unwrap()
        .apply(&root)
        .unwrap();

    let contents: Vec<(&str, &[u8])> = instructions
        .iter()
        .filter_map(|i| Some((i.destination.as_str(), i.source.content()?)))
        .collect();
    assert_eq!(
        contents,
        vec![("b/index.js", &b"patched"[..]), ("b/README.md", &b"# b"[..])]
    );
}

#[tokio::test]
async fn test_rename_collision_fails_under_error_policy() {
    let workspace = setup_workspace();
    let resolver = build_resolver(workspace.path(), registry());
    let root = resolver
        .resolve_spec(&DependencySpec::local("a", "vendor/a"))
        .await
        .unwrap();

    let rules = CopyRules::new()
        .include("*.txt")
        .include("*.js")
        .rename("^.*/([^/]+)$", "flat/$1")
        .rename("^([^/]+)$", "flat/$1")
        .on_conflict(OnConflict::Error);
    let instructions = CopyDependenciesFilter::new(&rules).unwrap().apply(&root).unwrap();
    let destinations: Vec<&str> = instructions.iter().map(|i| i.destination.as_str()).collect();
    assert_eq!(
        destinations,
        vec!["flat/a.txt", "flat/index.js", "flat/shared", "flat/util.txt"]
    );

    write(workspace.path(), "vendor/a/extra/a.txt", "another a");
    let fresh = build_resolver(workspace.path(), registry());
    let root = fresh
        .resolve_spec(&DependencySpec::local("a", "vendor/a"))
        .await
        .unwrap();
    let err = CopyDependenciesFilter::new(&rules).unwrap().apply(&root).unwrap_err();
    assert!(matches!(err, deps_filter::Error::Conflict { ref destination, .. } if destination == "flat/a.txt"));
}
