//! Reduce a resolved tree to copy instructions

use std::collections::{HashMap, HashSet};

use deps_fs::RelativePath;
use deps_tree::{FileKind, FileStruct, Tree};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;

use crate::rules::{CopyRules, OnConflict};
use crate::{Error, Result};

/// One entry to write: where it comes from and where it lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyInstruction<'a> {
    pub source: &'a FileStruct,
    pub destination: RelativePath,
}

impl CopyInstruction<'_> {
    fn same_output(&self, other: &CopyInstruction<'_>) -> bool {
        self.source.kind() == other.source.kind()
            && self.source.checksum() == other.source.checksum()
            && self.source.link_target() == other.source.link_target()
    }
}

/// Applies [`CopyRules`] to the flattened view of a [`Tree`].
///
/// Exclusion runs first and drops matching paths. Inclusion then keeps only
/// matching paths (all of them when no include pattern is set). A plain
/// pattern is tested against the entry's own path; a pattern ending in `/`
/// matches a directory and everything beneath it. Surviving paths are renamed by the
/// first matching rule and destination collisions are settled according to
/// [`OnConflict`]. No I/O happens here.
#[derive(Debug)]
pub struct CopyDependenciesFilter {
    include: Option<PatternSet>,
    exclude: Option<PatternSet>,
    rename: Vec<(Regex, String)>,
    on_conflict: OnConflict,
}

impl CopyDependenciesFilter {
    pub fn new(rules: &CopyRules) -> Result<Self> {
        let rename = rules
            .rename
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (re, rule.replacement.clone()))
                    .map_err(|e| Error::invalid_pattern(&rule.pattern, e))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            include: PatternSet::build(&rules.include)?,
            exclude: PatternSet::build(&rules.exclude)?,
            rename,
            on_conflict: rules.on_conflict,
        })
    }

    pub fn on_conflict(&self) -> OnConflict {
        self.on_conflict
    }

    /// Produce the ordered copy instructions for `tree`.
    pub fn apply<'a>(&self, tree: &'a Tree) -> Result<Vec<CopyInstruction<'a>>> {
        let flattened: Vec<(&RelativePath, &FileStruct)> = tree.flatten().collect();
        let total = flattened.len();

        let survivors: Vec<(&RelativePath, &FileStruct)> = flattened
            .into_iter()
            .filter(|(path, _)| !self.is_excluded(path))
            .collect();
        let survivors = self.retain_included(survivors);

        let mut instructions = Vec::with_capacity(survivors.len());
        for (path, source) in survivors {
            instructions.push(CopyInstruction {
                source,
                destination: self.rename_path(path)?,
            });
        }

        let instructions = self.settle_conflicts(instructions)?;
        tracing::debug!(
            tree = %tree.spec(),
            total,
            kept = instructions.len(),
            "Applied copy rules"
        );
        Ok(instructions)
    }

    fn is_excluded(&self, path: &RelativePath) -> bool {
        self.exclude
            .as_ref()
            .is_some_and(|set| set.is_match(path))
    }

    fn retain_included<'a>(
        &self,
        entries: Vec<(&'a RelativePath, &'a FileStruct)>,
    ) -> Vec<(&'a RelativePath, &'a FileStruct)> {
        let Some(include) = &self.include else {
            return entries;
        };

        // Directories are kept for their kept contents, not on their own
        let mut required_dirs: HashSet<RelativePath> = HashSet::new();
        let mut matched: HashSet<&RelativePath> = HashSet::new();
        for (path, entry) in &entries {
            if include.is_match(path) {
                matched.insert(*path);
                if entry.kind() != FileKind::Directory {
                    let mut parent = path.parent();
                    while let Some(dir) = parent {
                        parent = dir.parent();
                        if !required_dirs.insert(dir) {
                            break;
                        }
                    }
                }
            }
        }

        entries
            .into_iter()
            .filter(|(path, _)| matched.contains(path) || required_dirs.contains(*path))
            .collect()
    }

    fn rename_path(&self, path: &RelativePath) -> Result<RelativePath> {
        let Some((re, replacement)) = self.rename.iter().find(|(re, _)| re.is_match(path.as_str()))
        else {
            return Ok(path.clone());
        };

        let renamed = re.replace(path.as_str(), replacement.as_str());
        RelativePath::new(renamed.as_ref()).map_err(|e| Error::InvalidRename {
            path: path.to_string(),
            renamed: renamed.to_string(),
            reason: e.to_string(),
        })
    }

    fn settle_conflicts<'a>(
        &self,
        instructions: Vec<CopyInstruction<'a>>,
    ) -> Result<Vec<CopyInstruction<'a>>> {
        let mut settled: Vec<CopyInstruction<'a>> = Vec::with_capacity(instructions.len());
        let mut positions: HashMap<RelativePath, usize> = HashMap::new();

        for instruction in instructions {
            let Some(&index) = positions.get(&instruction.destination) else {
                positions.insert(instruction.destination.clone(), settled.len());
                settled.push(instruction);
                continue;
            };

            let existing = &settled[index];
            if existing.same_output(&instruction) {
                continue;
            }

            match self.on_conflict {
                OnConflict::Overwrite => {
                    tracing::debug!(
                        destination = %instruction.destination,
                        replaced = %describe(existing.source),
                        by = %describe(instruction.source),
                        "Overwriting conflicting destination"
                    );
                    settled[index] = instruction;
                }
                OnConflict::Skip => {
                    tracing::warn!(
                        destination = %instruction.destination,
                        kept = %describe(existing.source),
                        skipped = %describe(instruction.source),
                        "Skipping conflicting destination"
                    );
                }
                OnConflict::Error => {
                    return Err(Error::Conflict {
                        destination: instruction.destination.to_string(),
                        first: describe(existing.source),
                        second: describe(instruction.source),
                    });
                }
            }
        }

        Ok(settled)
    }
}

/// Compiled include or exclude patterns.
///
/// Patterns written with a trailing `/` are kept apart: they match the
/// directory they name as well as any path beneath it.
#[derive(Debug)]
struct PatternSet {
    own_path: Option<GlobSet>,
    subtree: Option<GlobSet>,
}

impl PatternSet {
    fn build(patterns: &[String]) -> Result<Option<Self>> {
        if patterns.is_empty() {
            return Ok(None);
        }
        let (subtree, own_path): (Vec<&String>, Vec<&String>) =
            patterns.iter().partition(|p| p.ends_with('/'));
        Ok(Some(Self {
            own_path: build_globset(own_path.iter().map(|p| (p.as_str(), p.as_str())))?,
            subtree: build_globset(
                subtree
                    .iter()
                    .map(|p| (p.as_str(), p.trim_end_matches('/'))),
            )?,
        }))
    }

    fn is_match(&self, path: &RelativePath) -> bool {
        if self
            .own_path
            .as_ref()
            .is_some_and(|set| set.is_match(path.as_str()))
        {
            return true;
        }
        let Some(subtree) = &self.subtree else {
            return false;
        };
        let mut current = Some(path.clone());
        while let Some(dir) = current {
            if subtree.is_match(dir.as_str()) {
                return true;
            }
            current = dir.parent();
        }
        false
    }
}

/// Compile `(written, glob)` pairs; `written` is what errors report.
fn build_globset<'p>(
    patterns: impl Iterator<Item = (&'p str, &'p str)>,
) -> Result<Option<GlobSet>> {
    let mut builder = GlobSetBuilder::new();
    let mut written = Vec::new();
    for (pattern, glob) in patterns {
        if glob.is_empty() {
            return Err(Error::invalid_pattern(pattern, "pattern names no path"));
        }
        let glob = GlobBuilder::new(glob)
            .literal_separator(false)
            .build()
            .map_err(|e| Error::invalid_pattern(pattern, e))?;
        builder.add(glob);
        written.push(pattern);
    }
    if written.is_empty() {
        return Ok(None);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| Error::invalid_pattern(&written.join(", "), e))
}

fn describe(entry: &FileStruct) -> String {
    format!("'{}' from {}", entry.path(), entry.origin())
}
