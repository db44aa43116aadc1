//! Default writer for copy instructions

use std::fs;
use std::path::Path;

use deps_fs::io::write_atomic;
use deps_tree::FileKind;

use crate::filter::CopyInstruction;
use crate::{Error, Result};

/// Counts of what [`materialize`] wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    /// Symlinks that could not be represented on this platform.
    pub skipped: usize,
}

impl MaterializeReport {
    pub fn total(&self) -> usize {
        self.files + self.directories + self.symlinks
    }
}

/// Write `instructions` below `root` in order.
///
/// Files are written atomically, directories created with their parents and
/// symlinks recreated on unix. Existing files at a destination are replaced.
/// The instruction list is taken as final; conflict handling already
/// happened in [`CopyDependenciesFilter::apply`](crate::CopyDependenciesFilter::apply).
pub fn materialize(instructions: &[CopyInstruction<'_>], root: &Path) -> Result<MaterializeReport> {
    let mut report = MaterializeReport::default();

    for instruction in instructions {
        let target = root.join(instruction.destination.to_native());
        match instruction.source.kind() {
            FileKind::File => {
                write_atomic(&target, instruction.source.content().unwrap_or_default())?;
                report.files += 1;
            }
            FileKind::Directory => {
                fs::create_dir_all(&target).map_err(|e| deps_fs::Error::io(&target, e))?;
                report.directories += 1;
            }
            FileKind::Symlink => {
                if write_symlink(instruction.source.link_target().unwrap_or_default(), &target)? {
                    report.symlinks += 1;
                } else {
                    report.skipped += 1;
                }
            }
        }
    }

    tracing::info!(
        root = %root.display(),
        files = report.files,
        directories = report.directories,
        symlinks = report.symlinks,
        "Materialized dependencies"
    );
    Ok(report)
}

#[cfg(unix)]
fn write_symlink(link_target: &str, path: &Path) -> Result<bool> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| deps_fs::Error::io(parent, e))?;
    }
    if fs::symlink_metadata(path).is_ok() {
        fs::remove_file(path).map_err(|e| deps_fs::Error::io(path, e))?;
    }
    std::os::unix::fs::symlink(link_target, path)
        .map_err(|e| Error::Fs(deps_fs::Error::io(path, e)))?;
    Ok(true)
}

#[cfg(not(unix))]
fn write_symlink(link_target: &str, path: &Path) -> Result<bool> {
    tracing::warn!(path = %path.display(), target = link_target, "Symlinks are not supported here, skipping");
    Ok(false)
}
