//! Resolution algorithm: manifests, dispatch, subpaths, cycles and errors

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use deps_resolver::{
    BaseResolver, DependencySpec, Error, FetchErrorKind, FetchedEntry, FetchedSource, GitStrategy,
    LocalStrategy, MultiResolver, RegistryStrategy,
};
use deps_test_utils::{ManifestBuilder, MemoryFetcher, MemoryRegistry, source};
use pretty_assertions::assert_eq;

fn with_manifest(files: &[(&str, &str)], manifest: ManifestBuilder) -> FetchedSource {
    let mut src = source(files);
    src.entries.push(manifest.entry());
    src
}

fn local_and_registry(local: Arc<MemoryFetcher>, registry: Arc<MemoryRegistry>) -> MultiResolver {
    MultiResolver::new(vec![
        Box::new(BaseResolver::new(LocalStrategy::new(local))),
        Box::new(BaseResolver::new(RegistryStrategy::new(registry))),
    ])
}

fn paths(tree: &deps_resolver::Tree) -> Vec<String> {
    tree.entries().iter().map(|e| e.path().to_string()).collect()
}

#[tokio::test]
async fn test_local_and_registry_example() {
    let local = Arc::new(MemoryFetcher::new().with_source(
        "a",
        with_manifest(&[("a.txt", "a")], ManifestBuilder::new().registry("c", "1.x")),
    ));
    let registry = Arc::new(
        MemoryRegistry::new()
            .with_package("b", "2.3.0", source(&[("b.txt", "b")]))
            .with_package("c", "1.4.0", source(&[("c.txt", "c")])),
    );
    let resolver = local_and_registry(local.clone(), registry.clone());

    let a = DependencySpec::local("a", "./a");
    let b = DependencySpec::registry("b", "^2.0");
    let root = resolver.resolve_all(&[a.clone(), b.clone()]).await.into_result().unwrap();

    let children: Vec<&str> = root.children().map(|(spec, _)| spec.name()).collect();
    assert_eq!(children, vec!["a", "b"]);

    let a_tree = root.child(&a).unwrap();
    let a_children: Vec<&str> = a_tree.children().map(|(spec, _)| spec.name()).collect();
    assert_eq!(a_children, vec!["c"]);
    assert_eq!(root.child(&b).unwrap().children().count(), 0);
    assert_eq!(root.child(&b).unwrap().resolved_version(), "2.3.0");

    // The registry spec never reaches the local fetch path
    assert_eq!(local.resolve_count("b"), 0);
    assert_eq!(local.fetch_count("b"), 0);
    assert_eq!(local.total_fetches(), 1);

    let flat: BTreeSet<String> = root.flatten().map(|(p, _)| p.to_string()).collect();
    assert_eq!(
        flat,
        ["a.txt", "b.txt", "c.txt", "deps.toml"].iter().map(|s| s.to_string()).collect()
    );
}

#[tokio::test]
async fn test_diamond_resolves_shared_dependency_once() {
    let local = Arc::new(
        MemoryFetcher::new()
            .with_source("a", with_manifest(&[], ManifestBuilder::new().registry("shared", "^1")))
            .with_source("b", with_manifest(&[], ManifestBuilder::new().registry("shared", "1.x"))),
    );
    let registry = Arc::new(MemoryRegistry::new().with_package("shared", "1.1.0", source(&[("s", "s")])));
    let resolver = local_and_registry(local, registry.clone());

    let root = resolver
        .resolve_all(&[DependencySpec::local("a", "a"), DependencySpec::local("b", "b")])
        .await
        .into_result()
        .unwrap();

    let via_a = root.child_by_name("a").unwrap().child_by_name("shared").unwrap();
    let via_b = root.child_by_name("b").unwrap().child_by_name("shared").unwrap();
    assert!(Arc::ptr_eq(via_a, via_b));
    assert_eq!(registry.download_count("shared"), 1);
    assert_eq!(root.flatten().filter(|(p, _)| p.as_str() == "s").count(), 1);
}

#[tokio::test]
async fn test_parent_entry_shadows_nested_entry() {
    let local = Arc::new(MemoryFetcher::new().with_source(
        "app",
        with_manifest(&[("config.txt", "app")], ManifestBuilder::new().registry("lib", "1")),
    ));
    let registry = Arc::new(MemoryRegistry::new().with_package(
        "lib",
        "1.0.0",
        source(&[("config.txt", "lib"), ("lib.txt", "lib")]),
    ));
    let resolver = local_and_registry(local, registry);

    let tree = resolver.resolve_spec(&DependencySpec::local("app", "app")).await.unwrap();
    let config = tree
        .flatten()
        .find(|(p, _)| p.as_str() == "config.txt")
        .map(|(_, entry)| entry.content().unwrap().to_vec())
        .unwrap();
    assert_eq!(config, b"app".to_vec());
}

#[tokio::test]
async fn test_resolution_order_does_not_change_flattened_content() {
    let registry = Arc::new(
        MemoryRegistry::new()
            .with_package("x", "1.0.0", source(&[("x/1", "x"), ("x/2", "x")]))
            .with_package("y", "1.0.0", source(&[("y/1", "y")])),
    );
    let forward = local_and_registry(Arc::new(MemoryFetcher::new()), registry.clone());
    let backward = local_and_registry(Arc::new(MemoryFetcher::new()), registry);
    let x = DependencySpec::registry("x", "1");
    let y = DependencySpec::registry("y", "1");

    let collect = |tree: Arc<deps_resolver::Tree>| -> BTreeSet<(String, Vec<u8>)> {
        tree.flatten()
            .map(|(p, e)| (p.to_string(), e.content().unwrap_or_default().to_vec()))
            .collect()
    };
    let a = collect(forward.resolve_all(&[x.clone(), y.clone()]).await.into_result().unwrap());
    let b = collect(backward.resolve_all(&[y, x]).await.into_result().unwrap());
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_nested_local_paths_are_relative_to_parent() {
    let local = Arc::new(
        MemoryFetcher::new()
            .with_source(
                "vendor/a",
                with_manifest(&[("a", "")], ManifestBuilder::new().local("d", "../d")),
            )
            .with_source("vendor/d", source(&[("d", "")])),
    );
    let resolver = local_and_registry(local.clone(), Arc::new(MemoryRegistry::new()));

    let tree = resolver
        .resolve_spec(&DependencySpec::local("a", "./vendor/a/"))
        .await
        .unwrap();

    let d = tree.child_by_name("d").unwrap();
    assert_eq!(d.spec().location(), "./vendor/a/../d");
    assert_eq!(paths(d), vec!["d"]);
    assert_eq!(local.fetch_count("vendor/d"), 1);
}

#[tokio::test]
async fn test_subpath_selects_and_strips_prefix() {
    let mut package = source(&[("dist/app.js", "app"), ("dist/css/site.css", "css"), ("src/app.ts", "ts")]);
    package.entries.insert(0, FetchedEntry::directory("dist"));
    package.entries.insert(1, FetchedEntry::directory("dist/css"));
    let registry = Arc::new(MemoryRegistry::new().with_package("ui", "3.0.0", package));
    let resolver = local_and_registry(Arc::new(MemoryFetcher::new()), registry.clone());

    let whole = resolver.resolve_spec(&DependencySpec::registry("ui", "3")).await.unwrap();
    let dist = resolver
        .resolve_spec(&DependencySpec::registry("ui", "3").with_subpath("dist"))
        .await
        .unwrap();

    assert_eq!(paths(&dist), vec!["css", "app.js", "css/site.css"]);
    assert_eq!(whole.len(), 5);
    assert!(!Arc::ptr_eq(&whole, &dist));
    assert_eq!(registry.download_count("ui"), 2);

    let err = resolver
        .resolve_spec(&DependencySpec::registry("ui", "3").with_subpath("missing"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Resolution { ref source, .. } if source.kind == FetchErrorKind::NotFound
    ));
}

#[tokio::test]
async fn test_unresolvable_spec() {
    let resolver = MultiResolver::new(vec![Box::new(BaseResolver::new(LocalStrategy::new(
        Arc::new(MemoryFetcher::new()),
    )))]);
    let spec = DependencySpec::registry("b", "^2.0");

    let err = resolver.resolve_spec(&spec).await.unwrap_err();
    assert!(matches!(err, Error::Unresolvable { .. }));
    assert_eq!(err.spec(), Some(&spec));
}

#[tokio::test]
async fn test_nested_failure_carries_chain() {
    let local = Arc::new(MemoryFetcher::new().with_source(
        "a",
        with_manifest(&[], ManifestBuilder::new().registry("c", "1.x")),
    ));
    let resolver = local_and_registry(local, Arc::new(MemoryRegistry::new()));

    let err = resolver
        .resolve_spec(&DependencySpec::local("a", "a"))
        .await
        .unwrap_err();

    assert_eq!(err.spec().map(|s| s.name()), Some("c"));
    assert_eq!(err.chain().unwrap().to_string(), "a@* -> c@1.x");
    assert!(matches!(
        err,
        Error::Resolution { ref source, .. } if source.kind == FetchErrorKind::NotFound
    ));
}

#[tokio::test]
async fn test_no_matching_version() {
    let registry = Arc::new(MemoryRegistry::new().with_package("a", "1.0.0", source(&[])));
    let resolver = local_and_registry(Arc::new(MemoryFetcher::new()), registry.clone());

    let err = resolver
        .resolve_spec(&DependencySpec::registry("a", "^2"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Resolution { ref source, .. } if source.kind == FetchErrorKind::NoMatchingVersion
    ));
    assert_eq!(registry.download_count("a"), 0);
}

#[tokio::test]
async fn test_invalid_manifest_is_a_manifest_error() {
    let local = Arc::new(MemoryFetcher::new().with_source(
        "a",
        with_manifest(&[], ManifestBuilder::new().raw("c = { branch = \"main\" }")),
    ));
    let resolver = local_and_registry(local, Arc::new(MemoryRegistry::new()));

    let err = resolver
        .resolve_spec(&DependencySpec::local("a", "a"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Manifest { .. }));
    assert_eq!(err.spec().map(|s| s.name()), Some("a"));
}

#[tokio::test]
async fn test_invalid_entry_path_is_a_tree_error() {
    let local = Arc::new(MemoryFetcher::new().with_source("a", source(&[("../escape", "x")])));
    let resolver = local_and_registry(local, Arc::new(MemoryRegistry::new()));

    let err = resolver
        .resolve_spec(&DependencySpec::local("a", "a"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Tree {
            source: deps_tree::Error::InvalidPath { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_direct_cycle_is_reported() {
    let local = Arc::new(
        MemoryFetcher::new()
            .with_source("a", with_manifest(&[], ManifestBuilder::new().local("b", "../b")))
            .with_source("b", with_manifest(&[], ManifestBuilder::new().local("a", "../a"))),
    );
    let resolver = local_and_registry(local, Arc::new(MemoryRegistry::new()));

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        resolver.resolve_spec(&DependencySpec::local("a", "a")),
    )
    .await
    .expect("cycle must not deadlock")
    .unwrap_err();

    assert!(matches!(err, Error::CyclicDependency { .. }));
    assert_eq!(err.chain().unwrap().to_string(), "a@* -> b@* -> a@*");
    assert!(resolver.cache().is_empty());
}

#[tokio::test]
async fn test_concurrent_cross_cycle_does_not_deadlock() {
    let local = Arc::new(
        MemoryFetcher::new()
            .with_source("a", with_manifest(&[], ManifestBuilder::new().local("b", "../b")))
            .with_source("b", with_manifest(&[], ManifestBuilder::new().local("a", "../a"))),
    );
    let resolver = local_and_registry(local, Arc::new(MemoryRegistry::new()));

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        resolver.resolve_all(&[DependencySpec::local("a", "a"), DependencySpec::local("b", "b")]),
    )
    .await
    .expect("cycle must not deadlock");

    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|e| matches!(e, Error::CyclicDependency { .. })));
    assert_eq!(report.root.children().count(), 0);
}

#[tokio::test]
async fn test_partial_report_keeps_successful_subtrees() {
    let local = Arc::new(MemoryFetcher::new().with_source("ok", source(&[("ok.txt", "")])));
    let resolver = local_and_registry(local, Arc::new(MemoryRegistry::new()));

    let report = resolver
        .resolve_all(&[DependencySpec::local("ok", "ok"), DependencySpec::local("gone", "gone")])
        .await;

    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].spec().map(|s| s.name()), Some("gone"));
    assert!(report.root.child_by_name("ok").is_some());
    assert!(report.into_result().is_err());
}

#[tokio::test]
async fn test_git_refs_on_same_commit_share_entry() {
    let repo_source = source(&[("README.md", "# e")]);
    let git = Arc::new(
        MemoryFetcher::new()
            .with_ref("https://host/e", "v1", "c0ffee", repo_source.clone())
            .with_ref("https://host/e", "main", "c0ffee", repo_source),
    );
    let resolver = MultiResolver::new(vec![Box::new(BaseResolver::new(GitStrategy::new(git.clone())))]);

    let v1 = resolver
        .resolve_spec(&DependencySpec::git("e", "https://HOST/e.git", "v1"))
        .await
        .unwrap();
    let main = resolver
        .resolve_spec(&DependencySpec::git("e", "https://host/e/", "main"))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&v1, &main));
    assert_eq!(v1.resolved_version(), "c0ffee");
    assert_eq!(git.fetch_count("https://host/e"), 1);
}

#[tokio::test]
async fn test_cross_strategy_nesting() {
    let git = Arc::new(MemoryFetcher::new().with_ref(
        "https://host/tools",
        "HEAD",
        "abc",
        source(&[("tool.sh", "#!/bin/sh")]),
    ));
    let registry = Arc::new(MemoryRegistry::new().with_package(
        "pkg",
        "1.0.0",
        with_manifest(&[], ManifestBuilder::new().git("tools", "https://host/tools.git", "HEAD")),
    ));
    let resolver = MultiResolver::new(vec![
        Box::new(BaseResolver::new(GitStrategy::new(git))),
        Box::new(BaseResolver::new(RegistryStrategy::new(registry))),
    ]);

    let tree = resolver
        .resolve_spec(&DependencySpec::registry("pkg", "1"))
        .await
        .unwrap();
    let tools = tree.child_by_name("tools").unwrap();
    assert_eq!(tools.resolved_version(), "abc");
    assert!(tree.find("tools/tool.sh").is_ok());
}
