//! Shared test fixtures for the dependency resolver workspace.
//!
//! It is a dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`memory`]: in-memory [`Fetcher`](deps_resolver::Fetcher) and
//!   [`RegistryClient`](deps_resolver::RegistryClient) with call counters
//!   and gates for concurrency tests
//! - [`builders`]: fetched-source and manifest builders
//! - [`git`]: real repositories with committed files

pub mod builders;
pub mod git;
pub mod memory;

pub use builders::{ManifestBuilder, source};
pub use memory::{MemoryFetcher, MemoryRegistry};
