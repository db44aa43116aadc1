//! Version constraint parsing and matching.
//!
//! Supports two constraint styles:
//!
//! - **Semver ranges** as used by registries (`^1.0`, `~1.2`, `1.x`,
//!   `>=1.0, <2.0`); a bare version means `^version`
//! - **Exact specifiers** (`==1.2.3`, `!=1.3.0`, `==1.2,<2`), where
//!   `major.minor` gets a `.0` patch
//!
//! ```
//! use deps_resolver::version::VersionConstraint;
//!
//! let constraint = VersionConstraint::parse("~1.2").unwrap();
//! assert!(constraint.satisfies("1.2.9"));
//! assert!(!constraint.satisfies("1.3.0"));
//!
//! let best = constraint.best_match(["1.2.3", "1.3.0", "1.2.10"]);
//! assert_eq!(best.as_deref(), Some("1.2.10"));
//! ```

use semver::{Version, VersionReq};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
    Ne,
}

#[derive(Debug, Clone)]
struct Specifier {
    op: CompareOp,
    version: Version,
}

impl Specifier {
    fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            CompareOp::Gte => candidate >= &self.version,
            CompareOp::Gt => candidate > &self.version,
            CompareOp::Lte => candidate <= &self.version,
            CompareOp::Lt => candidate < &self.version,
            CompareOp::Eq => candidate == &self.version,
            CompareOp::Ne => candidate != &self.version,
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Range(VersionReq),
    Specifiers(Vec<Specifier>),
}

/// A parsed version constraint that can be checked against versions.
#[derive(Debug, Clone)]
pub struct VersionConstraint {
    matcher: Matcher,
    raw: String,
}

impl VersionConstraint {
    /// Parse a constraint string. An empty string or `*` matches any
    /// release.
    pub fn parse(constraint: &str) -> Result<Self> {
        let raw = constraint.to_string();
        let trimmed = constraint.trim();

        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self {
                matcher: Matcher::Range(VersionReq::STAR),
                raw,
            });
        }

        if trimmed.contains("==") || trimmed.contains("!=") {
            return Ok(Self {
                matcher: Matcher::Specifiers(parse_specifiers(trimmed)?),
                raw,
            });
        }

        let req = VersionReq::parse(trimmed).map_err(|e| Error::InvalidConstraint {
            constraint: raw.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            matcher: Matcher::Range(req),
            raw,
        })
    }

    /// Check if a version string satisfies this constraint.
    ///
    /// Returns `false` if the version string cannot be parsed.
    pub fn satisfies(&self, version: &str) -> bool {
        normalize_version(version).is_ok_and(|v| self.satisfies_version(&v))
    }

    pub fn satisfies_version(&self, version: &Version) -> bool {
        match &self.matcher {
            Matcher::Range(req) => req.matches(version),
            Matcher::Specifiers(specs) => specs.iter().all(|spec| spec.matches(version)),
        }
    }

    /// The highest version in `candidates` that satisfies this constraint.
    ///
    /// Unparseable candidates are ignored. The original string of the
    /// winning candidate is returned.
    pub fn best_match<I, S>(&self, candidates: I) -> Option<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        candidates
            .into_iter()
            .filter_map(|candidate| {
                let raw = candidate.as_ref().to_string();
                normalize_version(&raw).ok().map(|v| (v, raw))
            })
            .filter(|(v, _)| self.satisfies_version(v))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, raw)| raw)
    }

    /// Return the original constraint string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_specifiers(constraint: &str) -> Result<Vec<Specifier>> {
    constraint
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_specifier)
        .collect()
}

/// Parse a single specifier like `>=1.2` or `!=1.3.0`.
fn parse_specifier(s: &str) -> Result<Specifier> {
    let (op, version_str) = if let Some(rest) = s.strip_prefix(">=") {
        (CompareOp::Gte, rest)
    } else if let Some(rest) = s.strip_prefix("<=") {
        (CompareOp::Lte, rest)
    } else if let Some(rest) = s.strip_prefix("!=") {
        (CompareOp::Ne, rest)
    } else if let Some(rest) = s.strip_prefix("==") {
        (CompareOp::Eq, rest)
    } else if let Some(rest) = s.strip_prefix('>') {
        (CompareOp::Gt, rest)
    } else if let Some(rest) = s.strip_prefix('<') {
        (CompareOp::Lt, rest)
    } else {
        (CompareOp::Eq, s)
    };

    let version_str = version_str.trim();
    let version = normalize_version(version_str).map_err(|reason| Error::InvalidConstraint {
        constraint: s.to_string(),
        reason,
    })?;

    Ok(Specifier { op, version })
}

/// Parse a version, appending `.0` when the patch component is missing.
///
/// - `"1.2"` -> `1.2.0`
/// - `"1.2.3"` -> `1.2.3`
/// - `"v1.2.3"` -> `1.2.3`
fn normalize_version(s: &str) -> std::result::Result<Version, String> {
    let s = s.trim();
    let s = s.strip_prefix('v').unwrap_or(s);

    if let Ok(v) = Version::parse(s) {
        return Ok(v);
    }

    let with_patch = format!("{s}.0");
    Version::parse(&with_patch).map_err(|e| format!("invalid version '{s}': {e}"))
}
