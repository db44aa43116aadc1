//! Building resolvers from configuration files

use std::sync::Arc;

use deps_resolver::{
    Capabilities, DependencySpec, Error, LocalDirFetcher, MultiResolver, ResolverConfig,
    StrategyKind,
};
use deps_test_utils::{MemoryRegistry, source};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn published() -> Arc<MemoryRegistry> {
    Arc::new(MemoryRegistry::new().with_package("pkg", "1.2.0", source(&[("pkg.txt", "pkg")])))
}

fn config_with_cache(cache: &TempDir) -> ResolverConfig {
    ResolverConfig::from_toml(&format!(
        r#"
strategies = ["registry", "local"]
manifest_file = "deps.toml"
cache_dir = '{}'
max_concurrency = 2
"#,
        cache.path().display()
    ))
    .unwrap()
}

#[test]
fn test_strategy_order_follows_config() {
    let cache = TempDir::new().unwrap();
    let config = config_with_cache(&cache);
    assert_eq!(config.strategies, vec![StrategyKind::Registry, StrategyKind::Local]);

    let capabilities = Capabilities::new()
        .with_local(Arc::new(LocalDirFetcher::new(".")))
        .with_registry(published());
    let resolver = MultiResolver::from_config(&config, capabilities).unwrap();

    let names: Vec<&str> = resolver.strategies().map(|s| s.name()).collect();
    assert_eq!(names, vec!["registry", "local"]);
    assert!(resolver.cache().store().is_some());
}

#[tokio::test]
async fn test_configured_cache_survives_restart() {
    let cache = TempDir::new().unwrap();
    let config = config_with_cache(&cache);
    let spec = DependencySpec::registry("pkg", "^1.0");

    let first_registry = published();
    let first = MultiResolver::from_config(
        &config,
        Capabilities::new()
            .with_local(Arc::new(LocalDirFetcher::new(".")))
            .with_registry(first_registry.clone()),
    )
    .unwrap();
    first.resolve_spec(&spec).await.unwrap();
    assert_eq!(first_registry.download_count("pkg"), 1);

    let second_registry = published();
    let second = MultiResolver::from_config(
        &config,
        Capabilities::new()
            .with_local(Arc::new(LocalDirFetcher::new(".")))
            .with_registry(second_registry.clone()),
    )
    .unwrap();
    let tree = second.resolve_spec(&spec).await.unwrap();

    assert_eq!(second_registry.download_count("pkg"), 0);
    assert_eq!(tree.resolved_version(), "1.2.0");
    assert_eq!(tree.entries()[0].content(), Some(&b"pkg"[..]));
}

#[test]
fn test_missing_capability_is_a_config_error() {
    let config = ResolverConfig::default();
    let err = MultiResolver::from_config(
        &config,
        Capabilities::new().with_registry(published()),
    )
    .unwrap_err();

    assert!(matches!(err, Error::Config { ref message } if message.contains("local")));
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = ResolverConfig::from_toml("strategies = []").unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}
