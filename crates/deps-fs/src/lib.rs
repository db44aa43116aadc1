//! Filesystem primitives for the dependency resolver
//!
//! Provides slash-normalized relative paths, content checksums and
//! locked atomic I/O used by the persisted cache and the materialization
//! writer.

pub mod checksum;
pub mod error;
pub mod io;
pub mod path;

pub use checksum::compute_checksum;
pub use error::{Error, Result};
pub use path::RelativePath;
