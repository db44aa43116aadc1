//! Strategy dispatch and top-level resolution runs.

use std::sync::Arc;

use async_trait::async_trait;
use deps_tree::{DependencySpec, Tree};
use futures::stream::{self, StreamExt};

use crate::cache::DependenciesCache;
use crate::config::{ResolverConfig, StrategyKind};
use crate::error::{Error, Result};
use crate::fetch::{Fetcher, RegistryClient};
use crate::git::GitStrategy;
use crate::local::LocalStrategy;
use crate::manifest::{ManifestReader, TomlManifestReader};
use crate::registry::RegistryStrategy;
use crate::resolver::{BaseResolver, DEFAULT_MAX_CONCURRENCY, ResolveContext, Resolver};
use crate::store::CacheStore;

/// Name of the synthetic spec that owns the trees of a [`MultiResolver::resolve_all`] run.
pub const ROOT_NAME: &str = "root";

/// Fetch capabilities handed to [`MultiResolver::from_config`].
#[derive(Clone, Default)]
pub struct Capabilities {
    pub local: Option<Arc<dyn Fetcher>>,
    pub git: Option<Arc<dyn Fetcher>>,
    pub registry: Option<Arc<dyn RegistryClient>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.local = Some(fetcher);
        self
    }

    pub fn with_git(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.git = Some(fetcher);
        self
    }

    pub fn with_registry(mut self, client: Arc<dyn RegistryClient>) -> Self {
        self.registry = Some(client);
        self
    }
}

/// Outcome of resolving a list of top-level specs.
///
/// Failed specs are left out of `root` and reported in `failures`, so one
/// broken dependency does not hide the rest.
#[derive(Debug)]
pub struct ResolutionReport {
    pub root: Arc<Tree>,
    pub failures: Vec<Error>,
}

impl ResolutionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// The root tree, or the first failure.
    pub fn into_result(self) -> Result<Arc<Tree>> {
        match self.failures.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(self.root),
        }
    }
}

/// Ordered list of resolvers sharing one [`DependenciesCache`].
///
/// Each spec goes to the first resolver whose `can_resolve` accepts it.
/// Nested specs found in manifests come back through the same instance, so
/// a diamond dependency reached from different strategies still resolves
/// once.
pub struct MultiResolver {
    strategies: Vec<Box<dyn Resolver>>,
    cache: Arc<DependenciesCache>,
    max_concurrency: usize,
}

impl MultiResolver {
    pub fn new(strategies: Vec<Box<dyn Resolver>>) -> Self {
        Self {
            strategies,
            cache: Arc::new(DependenciesCache::new()),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Share `cache` with other resolution runs.
    pub fn with_cache(mut self, cache: Arc<DependenciesCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Build the strategy list described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid or names a
    /// strategy whose capability is missing.
    pub fn from_config(config: &ResolverConfig, capabilities: Capabilities) -> Result<Self> {
        config.validate()?;

        let reader: Arc<dyn ManifestReader> =
            Arc::new(TomlManifestReader::with_file_name(&config.manifest_file));
        let missing = |kind: StrategyKind| Error::Config {
            message: format!("strategy '{kind}' is configured but no fetcher was provided"),
        };

        let mut strategies: Vec<Box<dyn Resolver>> = Vec::with_capacity(config.strategies.len());
        for &kind in &config.strategies {
            let resolver: Box<dyn Resolver> = match kind {
                StrategyKind::Local => {
                    let fetcher = capabilities.local.clone().ok_or_else(|| missing(kind))?;
                    Box::new(BaseResolver::new(LocalStrategy::new(fetcher)).with_manifest_reader(reader.clone()))
                }
                StrategyKind::Git => {
                    let fetcher = capabilities.git.clone().ok_or_else(|| missing(kind))?;
                    Box::new(BaseResolver::new(GitStrategy::new(fetcher)).with_manifest_reader(reader.clone()))
                }
                StrategyKind::Registry => {
                    let client = capabilities.registry.clone().ok_or_else(|| missing(kind))?;
                    Box::new(
                        BaseResolver::new(RegistryStrategy::new(client)).with_manifest_reader(reader.clone()),
                    )
                }
            };
            strategies.push(resolver);
        }

        let cache = match &config.cache_dir {
            Some(dir) => DependenciesCache::with_store(CacheStore::open(dir)),
            None => DependenciesCache::new(),
        };

        Ok(Self::new(strategies)
            .with_cache(Arc::new(cache))
            .with_max_concurrency(config.max_concurrency))
    }

    pub fn cache(&self) -> &Arc<DependenciesCache> {
        &self.cache
    }

    pub fn strategies(&self) -> impl Iterator<Item = &dyn Resolver> {
        self.strategies.iter().map(|s| s.as_ref())
    }

    /// The resolver that would handle `spec`.
    pub fn strategy_for(&self, spec: &DependencySpec) -> Option<&dyn Resolver> {
        self.strategies().find(|s| s.can_resolve(spec))
    }

    /// A fresh context rooted at this resolver.
    pub fn context(&self) -> ResolveContext<'_> {
        ResolveContext::new(self, &self.cache).with_max_concurrency(self.max_concurrency)
    }

    /// Resolve a single top-level spec.
    pub async fn resolve_spec(&self, spec: &DependencySpec) -> Result<Arc<Tree>> {
        let ctx = self.context();
        self.resolve(spec, &ctx).await
    }

    /// Resolve `specs` concurrently and attach them, in order, under a
    /// synthetic root tree.
    pub async fn resolve_all(&self, specs: &[DependencySpec]) -> ResolutionReport {
        let ctx = self.context();
        let results: Vec<Result<Arc<Tree>>> = stream::iter(specs)
            .map(|spec| self.resolve(spec, &ctx))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut root = Tree::new(DependencySpec::local(ROOT_NAME, "."), deps_tree::spec::ANY_VERSION);
        let mut failures = Vec::new();
        for (spec, result) in specs.iter().zip(results) {
            let attached = result.and_then(|tree| {
                root.add_child(spec.clone(), tree).map_err(|source| Error::Tree {
                    spec: spec.clone(),
                    chain: ctx.chain().with(spec),
                    source,
                })
            });
            if let Err(e) = attached {
                tracing::warn!(spec = %spec, error = %e, "Dependency failed to resolve");
                failures.push(e);
            }
        }

        tracing::info!(
            requested = specs.len(),
            failed = failures.len(),
            trees = root.tree_count(),
            "Resolution finished"
        );
        ResolutionReport {
            root: Arc::new(root),
            failures,
        }
    }
}

impl std::fmt::Debug for MultiResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let strategies: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("MultiResolver")
            .field("strategies", &strategies)
            .field("cache", &self.cache)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

#[async_trait]
impl Resolver for MultiResolver {
    fn name(&self) -> &str {
        "multi"
    }

    fn can_resolve(&self, spec: &DependencySpec) -> bool {
        self.strategy_for(spec).is_some()
    }

    async fn resolve(&self, spec: &DependencySpec, ctx: &ResolveContext<'_>) -> Result<Arc<Tree>> {
        match self.strategy_for(spec) {
            Some(strategy) => {
                tracing::trace!(spec = %spec, strategy = strategy.name(), "Dispatching");
                strategy.resolve(spec, ctx).await
            }
            None => Err(Error::Unresolvable {
                spec: spec.clone(),
                chain: ctx.chain().with(spec),
            }),
        }
    }
}
