//! Memoization of resolved trees
//!
//! [`DependenciesCache`] maps a [`CacheKey`] to one of two states:
//!
//! - **pending**: one requester (the leader) is running the resolution;
//!   everyone else asking for the key waits on a `watch` channel
//! - **ready**: the finished [`Tree`], handed out as a shared `Arc`
//!
//! A failed resolution is broadcast to the current waiters and then removed,
//! so the next request starts a fresh attempt. Dropping the leader's future
//! evicts the pending entry; waiters notice the closed channel and retry.
//!
//! The state lock is only held while switching states, never across an
//! `.await`.
//!
//! The cache also tracks which key is waiting on which. A request that would
//! wait, directly or through other pending keys, on its own requester fails
//! with [`Error::WaitCycle`] instead of deadlocking.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use deps_tree::{DependencySpec, Tree};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::key::CacheKey;
use crate::store::CacheStore;

type Outcome = Result<Arc<Tree>>;

/// Externally visible state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Ready,
}

enum Slot {
    Pending {
        rx: watch::Receiver<Option<Outcome>>,
        generation: u64,
    },
    Ready {
        tree: Arc<Tree>,
        last_access: Instant,
    },
}

#[derive(Default)]
struct State {
    slots: HashMap<CacheKey, Slot>,
    /// Requester key -> keys it is currently leading or waiting on.
    waits: HashMap<CacheKey, Vec<CacheKey>>,
    next_generation: u64,
}

impl State {
    /// Whether `to` can be reached from `from` by following wait edges.
    fn reaches(&self, from: &CacheKey, to: &CacheKey) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if visited.insert(current) {
                if let Some(next) = self.waits.get(current) {
                    stack.extend(next.iter());
                }
            }
        }
        false
    }

    fn remove_edge(&mut self, parent: &CacheKey, key: &CacheKey) {
        if let Some(edges) = self.waits.get_mut(parent) {
            if let Some(pos) = edges.iter().position(|k| k == key) {
                edges.swap_remove(pos);
            }
            if edges.is_empty() {
                self.waits.remove(parent);
            }
        }
    }

    fn remove_pending(&mut self, key: &CacheKey, generation: u64) -> bool {
        let owned = matches!(
            self.slots.get(key),
            Some(Slot::Pending { generation: g, .. }) if *g == generation
        );
        if owned {
            self.slots.remove(key);
        }
        owned
    }
}

enum Entry {
    Ready(Arc<Tree>),
    Wait(watch::Receiver<Option<Outcome>>),
    Lead(watch::Sender<Option<Outcome>>, u64),
}

/// Shared memo table for one resolution run, optionally backed by a
/// [`CacheStore`].
#[derive(Default)]
pub struct DependenciesCache {
    state: Mutex<State>,
    store: Option<CacheStore>,
}

impl DependenciesCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that also persists ready entries to `store`.
    pub fn with_store(store: CacheStore) -> Self {
        Self {
            state: Mutex::default(),
            store: Some(store),
        }
    }

    pub fn store(&self) -> Option<&CacheStore> {
        self.store.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the tree for `key`, running `resolve` only if no other
    /// requester has resolved or is resolving it.
    pub async fn get_or_resolve<F, Fut>(&self, key: CacheKey, resolve: F) -> Result<Arc<Tree>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Tree>>,
    {
        self.get_or_resolve_within(None, key, resolve).await
    }

    /// Like [`get_or_resolve`](Self::get_or_resolve), on behalf of the
    /// resolution of `parent`.
    ///
    /// # Errors
    ///
    /// Returns `Error::WaitCycle` if `key` is, directly or transitively,
    /// waiting on `parent` already.
    pub async fn get_or_resolve_within<F, Fut>(
        &self,
        parent: Option<&CacheKey>,
        key: CacheKey,
        resolve: F,
    ) -> Result<Arc<Tree>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Tree>>,
    {
        let (tx, generation) = loop {
            match self.enter(parent, &key)? {
                Entry::Ready(tree) => return Ok(tree),
                Entry::Wait(mut rx) => {
                    let _edge = WaitEdge::new(self, parent, &key);
                    tracing::debug!(%key, "Waiting on in-flight resolution");
                    let settled = rx.wait_for(Option::is_some).await.map(|v| v.clone());
                    match settled {
                        Ok(Some(outcome)) => return outcome,
                        _ => {
                            tracing::debug!(%key, "In-flight resolution was dropped, retrying");
                            continue;
                        }
                    }
                }
                Entry::Lead(tx, generation) => break (tx, generation),
            }
        };

        let _edge = WaitEdge::new(self, parent, &key);
        let mut pending = PendingGuard {
            cache: self,
            key: &key,
            generation,
            tx: Some(tx),
        };

        tracing::debug!(%key, "Resolving");
        let outcome = resolve().await.map(Arc::new);
        pending.settle(outcome.clone());
        outcome
    }

    fn enter(&self, parent: Option<&CacheKey>, key: &CacheKey) -> Result<Entry> {
        let mut state = self.lock();

        if let Some(parent) = parent {
            if state.reaches(key, parent) {
                tracing::debug!(%key, %parent, "Wait cycle detected");
                return Err(Error::WaitCycle { key: key.clone() });
            }
        }

        let entry = match state.slots.get_mut(key) {
            Some(Slot::Ready { tree, last_access }) => {
                *last_access = Instant::now();
                tracing::debug!(%key, "Cache hit");
                return Ok(Entry::Ready(tree.clone()));
            }
            Some(Slot::Pending { rx, .. }) => Entry::Wait(rx.clone()),
            None => {
                let (tx, rx) = watch::channel(None);
                let generation = state.next_generation;
                state.next_generation += 1;
                state
                    .slots
                    .insert(key.clone(), Slot::Pending { rx, generation });
                Entry::Lead(tx, generation)
            }
        };

        if let Some(parent) = parent {
            state
                .waits
                .entry(parent.clone())
                .or_default()
                .push(key.clone());
        }
        Ok(entry)
    }

    /// The ready tree for `key`, without resolving.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Tree>> {
        let mut state = self.lock();
        match state.slots.get_mut(key) {
            Some(Slot::Ready { tree, last_access }) => {
                *last_access = Instant::now();
                Some(tree.clone())
            }
            _ => None,
        }
    }

    pub fn state(&self, key: &CacheKey) -> Option<EntryState> {
        self.lock().slots.get(key).map(|slot| match slot {
            Slot::Pending { .. } => EntryState::Pending,
            Slot::Ready { .. } => EntryState::Ready,
        })
    }

    /// Remove the entry for `key` and its persisted record.
    ///
    /// Returns whether an in-memory entry existed.
    ///
    /// # Errors
    ///
    /// Returns `Error::CachePending` while the key is being resolved.
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let removed = {
            let mut state = self.lock();
            if matches!(state.slots.get(key), Some(Slot::Pending { .. })) {
                return Err(Error::CachePending { key: key.clone() });
            }
            state.slots.remove(key).is_some()
        };

        if let Some(store) = &self.store {
            store.remove(key)?;
        }
        tracing::debug!(%key, removed, "Invalidated cache entry");
        Ok(removed)
    }

    /// Drop ready entries not accessed within `max_idle`. Returns how many
    /// were dropped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let before = state.slots.len();
        state.slots.retain(|_, slot| match slot {
            Slot::Ready { last_access, .. } => now.duration_since(*last_access) <= max_idle,
            Slot::Pending { .. } => true,
        });
        let evicted = before - state.slots.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted idle cache entries");
        }
        evicted
    }

    /// Drop every ready entry. Pending entries are left to their leaders.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let before = state.slots.len();
        state
            .slots
            .retain(|_, slot| matches!(slot, Slot::Pending { .. }));
        before - state.slots.len()
    }

    /// Number of entries, pending ones included.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    /// Load a persisted tree for `key` if the store has one and `accept`
    /// approves its resolved version.
    ///
    /// The tree comes back with its own entries only, together with the
    /// specs of its children, which the caller resolves again. Unreadable or
    /// rejected records count as misses.
    pub fn load_persisted(
        &self,
        key: &CacheKey,
        accept: impl Fn(&str) -> bool,
    ) -> Option<(Tree, Vec<DependencySpec>)> {
        let store = self.store.as_ref()?;
        let record = match store.load(key) {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Failed to read persisted cache entry");
                return None;
            }
        };

        if !accept(&record.tree.resolved_version) {
            tracing::warn!(
                %key,
                version = %record.tree.resolved_version,
                "Persisted entry no longer satisfies constraint"
            );
            return None;
        }

        match record.tree.into_parts() {
            Ok(parts) => {
                tracing::debug!(%key, stored_at = %record.stored_at, "Loaded persisted cache entry");
                Some(parts)
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "Persisted cache entry is invalid");
                None
            }
        }
    }

    /// Write `tree` to the store, if there is one. Failures are logged.
    pub fn persist(&self, key: &CacheKey, constraint: &str, tree: &Tree) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(key, constraint, tree) {
                tracing::warn!(%key, error = %e, "Failed to persist cache entry");
            }
        }
    }
}

impl std::fmt::Debug for DependenciesCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependenciesCache")
            .field("entries", &self.len())
            .field("store", &self.store)
            .finish()
    }
}

/// Removes the `parent -> key` wait edge when the wait or lead ends.
struct WaitEdge<'a> {
    cache: &'a DependenciesCache,
    parent: Option<&'a CacheKey>,
    key: &'a CacheKey,
}

impl<'a> WaitEdge<'a> {
    fn new(cache: &'a DependenciesCache, parent: Option<&'a CacheKey>, key: &'a CacheKey) -> Self {
        Self { cache, parent, key }
    }
}

impl Drop for WaitEdge<'_> {
    fn drop(&mut self) {
        if let Some(parent) = self.parent {
            self.cache.lock().remove_edge(parent, self.key);
        }
    }
}

/// Owns a pending slot for the leader. Evicts the slot if dropped before
/// [`PendingGuard::settle`].
struct PendingGuard<'a> {
    cache: &'a DependenciesCache,
    key: &'a CacheKey,
    generation: u64,
    tx: Option<watch::Sender<Option<Outcome>>>,
}

impl PendingGuard<'_> {
    fn settle(&mut self, outcome: Outcome) {
        {
            let mut state = self.cache.lock();
            match &outcome {
                Ok(tree) => {
                    if state.remove_pending(self.key, self.generation) {
                        state.slots.insert(
                            self.key.clone(),
                            Slot::Ready {
                                tree: tree.clone(),
                                last_access: Instant::now(),
                            },
                        );
                    }
                    tracing::debug!(key = %self.key, "Resolution ready");
                }
                Err(e) => {
                    state.remove_pending(self.key, self.generation);
                    tracing::debug!(key = %self.key, error = %e, "Resolution failed");
                }
            }
        }

        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(outcome));
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.cache.lock().remove_pending(self.key, self.generation);
            tracing::debug!(key = %self.key, "Evicted abandoned pending entry");
        }
    }
}
