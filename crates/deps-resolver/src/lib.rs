//! Dependency resolution engine.
//!
//! Resolves [`DependencySpec`]s into [`Tree`]s through an ordered list of
//! strategies ([`MultiResolver`]). Every strategy runs the same algorithm
//! ([`BaseResolver`]): compute a [`CacheKey`], consult the shared
//! [`DependenciesCache`], and on a miss fetch the source, read its manifest
//! and resolve the nested specs through the same run.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use deps_resolver::{Capabilities, DependencySpec, LocalDirFetcher, MultiResolver, ResolverConfig};
//!
//! # async fn run() -> deps_resolver::Result<()> {
//! let config = ResolverConfig {
//!     strategies: vec![deps_resolver::StrategyKind::Local],
//!     ..ResolverConfig::default()
//! };
//! let capabilities = Capabilities::new().with_local(Arc::new(LocalDirFetcher::new(".")));
//! let resolver = MultiResolver::from_config(&config, capabilities)?;
//!
//! let report = resolver
//!     .resolve_all(&[DependencySpec::local("vendored", "vendor/lib")])
//!     .await;
//! let root = report.into_result()?;
//! for (path, entry) in root.flatten() {
//!     println!("{path} <- {}", entry.origin());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod git;
pub mod key;
pub mod local;
pub mod manifest;
pub mod multi;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod version;

pub use cache::{DependenciesCache, EntryState};
pub use config::{ResolverConfig, StrategyKind};
pub use deps_tree::{DependencySpec, SourceKind, Tree};
pub use error::{Error, Result, SpecChain};
pub use fetch::{FetchError, FetchErrorKind, FetchedEntry, FetchedSource, Fetcher, RegistryClient};
pub use git::{GitFetcher, GitStrategy};
pub use key::{CacheKey, VersionKey};
pub use local::{LocalDirFetcher, LocalStrategy};
pub use manifest::{MANIFEST_FILENAME, ManifestReader, TomlManifestReader};
pub use multi::{Capabilities, MultiResolver, ResolutionReport};
pub use registry::RegistryStrategy;
pub use resolver::{BaseResolver, FetchStrategy, ResolveContext, Resolver, Selection};
pub use store::CacheStore;
pub use version::VersionConstraint;
