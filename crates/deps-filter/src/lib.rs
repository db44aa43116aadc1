//! Turn a resolved dependency tree into files on disk.
//!
//! [`CopyDependenciesFilter`] applies [`CopyRules`] to the flattened view of
//! a [`Tree`](deps_tree::Tree) and returns [`CopyInstruction`]s without
//! touching the filesystem. [`materialize`] is the default writer for those
//! instructions.
//!
//! ```no_run
//! use std::path::Path;
//! use deps_filter::{CopyDependenciesFilter, CopyRules, materialize};
//!
//! # fn run(tree: &deps_tree::Tree) -> deps_filter::Result<()> {
//! let rules = CopyRules::new().exclude("*.md").rename("^src/(.*)$", "lib/$1");
//! let filter = CopyDependenciesFilter::new(&rules)?;
//! let instructions = filter.apply(tree)?;
//! materialize(&instructions, Path::new("vendor"))?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod filter;
pub mod materialize;
pub mod rules;

pub use error::{Error, Result};
pub use filter::{CopyDependenciesFilter, CopyInstruction};
pub use materialize::{MaterializeReport, materialize};
pub use rules::{CopyRules, OnConflict, RenameRule};
