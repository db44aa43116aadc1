//! The resolver contract and the shared resolution algorithm.
//!
//! [`Resolver`] is what [`MultiResolver`](crate::MultiResolver) dispatches
//! to. [`BaseResolver`] implements it once for every source kind: it turns a
//! spec into a [`CacheKey`], goes through the [`DependenciesCache`], and on
//! a miss fetches the source, reads its manifest and resolves the nested
//! specs through the root resolver of the run. The only source-specific
//! part is the [`FetchStrategy`].

use std::sync::Arc;

use async_trait::async_trait;
use deps_fs::RelativePath;
use deps_fs::checksum::hex_digest;
use deps_tree::{DependencySpec, FileKind, FileStruct, SourceKind, Tree};
use futures::stream::{self, StreamExt};
use tracing::Instrument;

use crate::cache::DependenciesCache;
use crate::error::{Error, Result, SpecChain};
use crate::fetch::{FetchError, FetchErrorKind, FetchedSource};
use crate::key::{CacheKey, VersionKey};
use crate::manifest::{ManifestReader, TomlManifestReader};

/// Default number of sibling dependencies resolved at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Something that can turn a [`DependencySpec`] into a [`Tree`].
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn can_resolve(&self, spec: &DependencySpec) -> bool;

    /// Resolve `spec` and its transitive dependencies.
    async fn resolve(&self, spec: &DependencySpec, ctx: &ResolveContext<'_>) -> Result<Arc<Tree>>;
}

/// Per-request state threaded through a resolution run.
///
/// Carries the run's root resolver (nested specs go back through it, so a
/// registry package can depend on a git repository), the shared cache, and
/// the chain of specs and keys above the current request.
#[derive(Clone)]
pub struct ResolveContext<'a> {
    root: &'a dyn Resolver,
    cache: &'a DependenciesCache,
    chain: SpecChain,
    keys: Vec<CacheKey>,
    max_concurrency: usize,
}

impl<'a> ResolveContext<'a> {
    pub fn new(root: &'a dyn Resolver, cache: &'a DependenciesCache) -> Self {
        Self {
            root,
            cache,
            chain: SpecChain::new(),
            keys: Vec::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Limit how many nested specs of one tree are resolved concurrently.
    /// Values below one are treated as one.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &'a DependenciesCache {
        self.cache
    }

    /// Specs from the top-level request down to, but excluding, the spec
    /// being resolved.
    pub fn chain(&self) -> &SpecChain {
        &self.chain
    }

    /// Key of the tree whose nested specs are being resolved.
    pub fn parent_key(&self) -> Option<&CacheKey> {
        self.keys.last()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Whether `key` is already being resolved further up this chain.
    pub fn is_resolving(&self, key: &CacheKey) -> bool {
        self.keys.contains(key)
    }

    /// Context for the nested specs of `spec`, resolved under `key`.
    pub fn descend(&self, spec: &DependencySpec, key: CacheKey) -> Self {
        let mut keys = self.keys.clone();
        keys.push(key);
        Self {
            root: self.root,
            cache: self.cache,
            chain: self.chain.with(spec),
            keys,
            max_concurrency: self.max_concurrency,
        }
    }

    /// Resolve `spec` through the root resolver of this run.
    pub async fn resolve(&self, spec: &DependencySpec) -> Result<Arc<Tree>> {
        self.root.resolve(spec, self).await
    }
}

/// The version a strategy selected for a spec, before fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Version half of the cache key.
    pub key: VersionKey,
    /// Recorded as the tree's resolved version.
    pub version: String,
}

impl Selection {
    /// A concrete version that identifies the fetched bytes.
    pub fn resolved(version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            key: VersionKey::Resolved(version.clone()),
            version,
        }
    }

    /// A source without versions; the key is a digest of `marker`.
    pub fn hashed(marker: impl Into<String>) -> Self {
        let version = marker.into();
        Self {
            key: VersionKey::ConstraintHash(hex_digest(version.as_bytes())),
            version,
        }
    }
}

/// The source-specific half of a resolver.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// The source kind handled by this strategy.
    fn kind(&self) -> SourceKind;

    fn can_resolve(&self, spec: &DependencySpec) -> bool {
        spec.kind() == self.kind()
    }

    /// Canonical form of the spec's location.
    fn identifier(&self, spec: &DependencySpec) -> String;

    /// Pick the version that will be fetched for `spec`.
    async fn select(&self, spec: &DependencySpec, identifier: &str) -> std::result::Result<Selection, FetchError>;

    /// Whether a previously resolved version may serve `spec`.
    fn accepts(&self, spec: &DependencySpec, resolved_version: &str) -> bool;

    /// Whether trees from this strategy may be written to a cache store.
    fn persistable(&self) -> bool {
        true
    }

    /// Fetch the full listing of `identifier` at the selected version.
    async fn fetch(
        &self,
        spec: &DependencySpec,
        identifier: &str,
        selection: &Selection,
    ) -> std::result::Result<FetchedSource, FetchError>;
}

/// A [`Resolver`] built from a [`FetchStrategy`] and a [`ManifestReader`].
pub struct BaseResolver<S> {
    strategy: S,
    manifest: Arc<dyn ManifestReader>,
}

impl<S: FetchStrategy> BaseResolver<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            manifest: Arc::new(TomlManifestReader::new()),
        }
    }

    pub fn with_manifest_reader(mut self, reader: Arc<dyn ManifestReader>) -> Self {
        self.manifest = reader;
        self
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Compute the cache key for `spec`.
    ///
    /// Selecting a version may query the source (registry listings, ref
    /// lookups), but never downloads it.
    pub async fn cache_key(&self, spec: &DependencySpec) -> std::result::Result<(CacheKey, Selection), FetchError> {
        let identifier = self.strategy.identifier(spec);
        let selection = self.strategy.select(spec, &identifier).await?;
        Ok((self.key_for(spec, &identifier, &selection), selection))
    }

    fn key_for(&self, spec: &DependencySpec, identifier: &str, selection: &Selection) -> CacheKey {
        let identifier = match spec.subpath() {
            Some(subpath) => format!("{identifier}#{subpath}"),
            None => identifier.to_string(),
        };
        CacheKey::new(self.strategy.kind(), identifier, selection.key.clone())
    }

    async fn resolve_inner(&self, spec: &DependencySpec, ctx: &ResolveContext<'_>) -> Result<Arc<Tree>> {
        let chain = ctx.chain().with(spec);
        let identifier = self.strategy.identifier(spec);
        let selection = self
            .strategy
            .select(spec, &identifier)
            .await
            .map_err(|source| Error::Resolution {
                spec: spec.clone(),
                chain: chain.clone(),
                source,
            })?;
        let key = self.key_for(spec, &identifier, &selection);

        if ctx.is_resolving(&key) {
            tracing::warn!(%key, chain = %chain, "Dependency cycle");
            return Err(Error::CyclicDependency {
                spec: spec.clone(),
                chain,
            });
        }

        let cache = ctx.cache();
        let nested_ctx = ctx.descend(spec, key.clone());
        let result = cache
            .get_or_resolve_within(ctx.parent_key(), key.clone(), || async {
                if self.strategy.persistable() {
                    if let Some((tree, nested)) =
                        cache.load_persisted(&key, |v| self.strategy.accepts(spec, v))
                    {
                        return self.attach_dependencies(tree, nested, &nested_ctx).await;
                    }
                }

                let tree = self
                    .fetch_and_build(spec, &identifier, &selection, &nested_ctx)
                    .await?;
                if self.strategy.persistable() {
                    cache.persist(&key, spec.constraint(), &tree);
                }
                Ok(tree)
            })
            .await;

        result.map_err(|e| match e {
            Error::WaitCycle { .. } => Error::CyclicDependency {
                spec: spec.clone(),
                chain,
            },
            other => other,
        })
    }

    /// Fetch `spec`, build its tree and attach its nested dependencies.
    ///
    /// `ctx` is the context of the nested specs: its chain already ends with
    /// `spec`.
    async fn fetch_and_build(
        &self,
        spec: &DependencySpec,
        identifier: &str,
        selection: &Selection,
        ctx: &ResolveContext<'_>,
    ) -> Result<Tree> {
        let chain = ctx.chain();
        let tree_err = |source: deps_tree::Error| Error::Tree {
            spec: spec.clone(),
            chain: chain.clone(),
            source,
        };

        let fetched = self
            .strategy
            .fetch(spec, identifier, selection)
            .await
            .map_err(|source| Error::Resolution {
                spec: spec.clone(),
                chain: chain.clone(),
                source,
            })?;

        let prefix = spec
            .subpath()
            .map(RelativePath::new)
            .transpose()
            .map_err(|e| tree_err(e.into()))?;

        let origin = Arc::new(spec.clone());
        let mut tree = Tree::new(origin.clone(), selection.version.clone());
        let mut manifest = None;
        let mut under_subpath = false;

        for entry in fetched.entries {
            let path = RelativePath::new(&entry.path).map_err(|e| tree_err(e.into()))?;
            let path = match &prefix {
                Some(prefix) => {
                    if path == *prefix {
                        under_subpath = true;
                    }
                    match path.strip_prefix(prefix) {
                        Some(stripped) => stripped,
                        None => continue,
                    }
                }
                None => path,
            };
            under_subpath = true;

            if entry.kind == FileKind::File && path.as_str() == self.manifest.file_name() {
                manifest = entry.content.clone();
            }
            let file = FileStruct::new(path.as_str(), entry.kind, entry.content, origin.clone())
                .map_err(tree_err)?;
            tree.add_entry(file).map_err(tree_err)?;
        }

        if let (Some(prefix), false) = (&prefix, under_subpath) {
            return Err(Error::Resolution {
                spec: spec.clone(),
                chain: chain.clone(),
                source: FetchError::new(
                    FetchErrorKind::NotFound,
                    format!("subpath '{prefix}' not found in {identifier}"),
                ),
            });
        }

        let nested: Vec<DependencySpec> = match manifest {
            Some(bytes) => self
                .manifest
                .parse(&bytes)
                .map_err(|message| Error::Manifest {
                    spec: spec.clone(),
                    chain: chain.clone(),
                    message,
                })?
                .into_iter()
                .map(|nested| nested.relative_to(spec))
                .collect(),
            None => Vec::new(),
        };

        tracing::info!(
            spec = %spec,
            version = %tree.resolved_version(),
            files = tree.len(),
            dependencies = nested.len(),
            "Fetched dependency"
        );

        self.attach_dependencies(tree, nested, ctx).await
    }

    /// Resolve `nested` through the root resolver and attach the results to
    /// `tree` in declaration order.
    ///
    /// Each nested spec goes through its own cache lookup, so a tree rebuilt
    /// from the store shares children with the rest of the run exactly like
    /// a freshly fetched one.
    async fn attach_dependencies(
        &self,
        mut tree: Tree,
        nested: Vec<DependencySpec>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Tree> {
        let chain = ctx.chain();
        let spec = tree.spec_arc().clone();
        let tree_err = |source: deps_tree::Error| Error::Tree {
            spec: (*spec).clone(),
            chain: chain.clone(),
            source,
        };

        // Siblings run to completion even if one fails.
        let results: Vec<Result<Arc<Tree>>> = stream::iter(nested.iter())
            .map(|nested| ctx.resolve(nested))
            .boxed()
            .buffered(ctx.max_concurrency())
            .collect()
            .await;

        let mut first_error = None;
        for (nested, result) in nested.into_iter().zip(results) {
            let child = match result {
                Ok(child) => child,
                Err(e) => {
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            if let Err(e) = tree.add_child(nested.clone(), child) {
                let err = match e {
                    deps_tree::Error::CyclicDependency { .. } => Error::CyclicDependency {
                        chain: chain.with(&nested),
                        spec: nested,
                    },
                    other => tree_err(other),
                };
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(tree),
        }
    }
}

#[async_trait]
impl<S: FetchStrategy> Resolver for BaseResolver<S> {
    fn name(&self) -> &str {
        self.strategy.name()
    }

    fn can_resolve(&self, spec: &DependencySpec) -> bool {
        self.strategy.can_resolve(spec)
    }

    async fn resolve(&self, spec: &DependencySpec, ctx: &ResolveContext<'_>) -> Result<Arc<Tree>> {
        let span = tracing::debug_span!("resolve", spec = %spec, strategy = self.strategy.name());
        self.resolve_inner(spec, ctx).instrument(span).await
    }
}
