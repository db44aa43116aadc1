//! In-memory fetch capabilities.
//!
//! Both fixtures count calls per identifier and can be gated: a gated
//! fixture parks every `fetch`/`download` until the test releases permits,
//! which lets concurrency tests pile up requesters on one pending key.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use deps_resolver::{FetchError, FetchErrorKind, FetchedSource, Fetcher, RegistryClient};
use tokio::sync::Semaphore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
struct Gate {
    semaphore: Option<Arc<Semaphore>>,
    started: AtomicUsize,
}

impl Gate {
    async fn pass(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(semaphore) = &self.semaphore {
            match semaphore.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => panic!("gate semaphore closed"),
            }
        }
    }

    fn release(&self, permits: usize) {
        if let Some(semaphore) = &self.semaphore {
            semaphore.add_permits(permits);
        }
    }
}

/// A [`Fetcher`] serving sources from memory.
///
/// Every identifier has a default version (`mem:<identifier>`) that any
/// constraint resolves to, unless the constraint was registered with
/// [`MemoryFetcher::with_ref`].
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    sources: Mutex<HashMap<(String, String), FetchedSource>>,
    defaults: Mutex<HashMap<String, String>>,
    refs: Mutex<HashMap<(String, String), String>>,
    failures: Mutex<HashMap<String, FetchError>>,
    fetches: Mutex<HashMap<String, usize>>,
    resolves: Mutex<HashMap<String, usize>>,
    gate: Gate,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park every `fetch` until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        Self {
            gate: Gate {
                semaphore: Some(Arc::new(Semaphore::new(0))),
                started: AtomicUsize::new(0),
            },
            ..Self::default()
        }
    }

    /// Serve `source` for `identifier` under its default version.
    pub fn with_source(self, identifier: &str, source: FetchedSource) -> Self {
        let version = format!("mem:{identifier}");
        lock(&self.defaults).insert(identifier.to_string(), version.clone());
        lock(&self.sources).insert((identifier.to_string(), version), source);
        self
    }

    /// Resolve `reference` to `version` and serve `source` for it.
    pub fn with_ref(self, identifier: &str, reference: &str, version: &str, source: FetchedSource) -> Self {
        lock(&self.refs).insert(
            (identifier.to_string(), reference.to_string()),
            version.to_string(),
        );
        lock(&self.sources).insert((identifier.to_string(), version.to_string()), source);
        self
    }

    /// Make fetches of `identifier` fail until [`clear_failure`](Self::clear_failure).
    pub fn fail(&self, identifier: &str, error: FetchError) {
        lock(&self.failures).insert(identifier.to_string(), error);
    }

    pub fn clear_failure(&self, identifier: &str) {
        lock(&self.failures).remove(identifier);
    }

    pub fn fetch_count(&self, identifier: &str) -> usize {
        lock(&self.fetches).get(identifier).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        lock(&self.fetches).values().sum()
    }

    pub fn resolve_count(&self, identifier: &str) -> usize {
        lock(&self.resolves).get(identifier).copied().unwrap_or(0)
    }

    /// Number of fetches that reached the gate.
    pub fn started(&self) -> usize {
        self.gate.started.load(Ordering::SeqCst)
    }

    pub fn release(&self, permits: usize) {
        self.gate.release(permits);
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn resolve_version(&self, identifier: &str, constraint: &str) -> Result<String, FetchError> {
        *lock(&self.resolves).entry(identifier.to_string()).or_default() += 1;

        if let Some(version) = lock(&self.refs).get(&(identifier.to_string(), constraint.to_string())) {
            return Ok(version.clone());
        }
        lock(&self.defaults)
            .get(identifier)
            .cloned()
            .ok_or_else(|| FetchError::not_found(format!("no source for '{identifier}'")))
    }

    async fn fetch(&self, identifier: &str, version: &str) -> Result<FetchedSource, FetchError> {
        *lock(&self.fetches).entry(identifier.to_string()).or_default() += 1;
        self.gate.pass().await;

        if let Some(error) = lock(&self.failures).get(identifier) {
            return Err(error.clone());
        }
        lock(&self.sources)
            .get(&(identifier.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| FetchError::not_found(format!("no source for '{identifier}' at {version}")))
    }
}

/// A [`RegistryClient`] serving packages from memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    packages: Mutex<HashMap<String, BTreeMap<String, FetchedSource>>>,
    failures: Mutex<HashMap<String, FetchError>>,
    downloads: Mutex<HashMap<String, usize>>,
    listings: Mutex<HashMap<String, usize>>,
    gate: Gate,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park every `download` until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        Self {
            gate: Gate {
                semaphore: Some(Arc::new(Semaphore::new(0))),
                started: AtomicUsize::new(0),
            },
            ..Self::default()
        }
    }

    pub fn with_package(self, name: &str, version: &str, source: FetchedSource) -> Self {
        self.publish(name, version, source);
        self
    }

    pub fn publish(&self, name: &str, version: &str, source: FetchedSource) {
        lock(&self.packages)
            .entry(name.to_string())
            .or_default()
            .insert(version.to_string(), source);
    }

    /// Make downloads of `name` fail until [`clear_failure`](Self::clear_failure).
    pub fn fail(&self, name: &str, error: FetchError) {
        lock(&self.failures).insert(name.to_string(), error);
    }

    pub fn clear_failure(&self, name: &str) {
        lock(&self.failures).remove(name);
    }

    pub fn download_count(&self, name: &str) -> usize {
        lock(&self.downloads).get(name).copied().unwrap_or(0)
    }

    pub fn total_downloads(&self) -> usize {
        lock(&self.downloads).values().sum()
    }

    pub fn listing_count(&self, name: &str) -> usize {
        lock(&self.listings).get(name).copied().unwrap_or(0)
    }

    /// Number of downloads that reached the gate.
    pub fn started(&self) -> usize {
        self.gate.started.load(Ordering::SeqCst)
    }

    pub fn release(&self, permits: usize) {
        self.gate.release(permits);
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn versions(&self, name: &str) -> Result<Vec<String>, FetchError> {
        *lock(&self.listings).entry(name.to_string()).or_default() += 1;
        lock(&self.packages)
            .get(name)
            .map(|versions| versions.keys().cloned().collect())
            .ok_or_else(|| FetchError::not_found(format!("package '{name}' is not published")))
    }

    async fn download(&self, name: &str, version: &str) -> Result<FetchedSource, FetchError> {
        *lock(&self.downloads).entry(name.to_string()).or_default() += 1;
        self.gate.pass().await;

        if let Some(error) = lock(&self.failures).get(name) {
            return Err(error.clone());
        }
        lock(&self.packages)
            .get(name)
            .and_then(|versions| versions.get(version))
            .cloned()
            .ok_or_else(|| {
                FetchError::new(
                    FetchErrorKind::NotFound,
                    format!("package '{name}' has no version {version}"),
                )
            })
    }
}
