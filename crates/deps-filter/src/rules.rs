//! Copy rule configuration
//!
//! Rules are usually loaded from TOML:
//!
//! ```toml
//! include = ["src/**"]
//! exclude = ["*.md"]
//! on_conflict = "skip"
//!
//! [[rename]]
//! pattern = "^src/(.*)$"
//! replacement = "lib/$1"
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// What to do when two surviving entries map to the same destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnConflict {
    /// The later entry replaces the earlier one.
    #[default]
    Overwrite,
    /// The earlier entry is kept and the later one dropped.
    Skip,
    /// Filtering fails with [`Error::Conflict`].
    Error,
}

impl FromStr for OnConflict {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "overwrite" | "replace" => Ok(OnConflict::Overwrite),
            "skip" | "keep" => Ok(OnConflict::Skip),
            "error" | "fail" => Ok(OnConflict::Error),
            _ => Err(Error::Config(format!("unknown conflict policy '{s}'"))),
        }
    }
}

impl fmt::Display for OnConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnConflict::Overwrite => write!(f, "overwrite"),
            OnConflict::Skip => write!(f, "skip"),
            OnConflict::Error => write!(f, "error"),
        }
    }
}

/// Regex rewrite applied to a surviving path.
///
/// `replacement` may reference capture groups as `$1` or `${name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameRule {
    pub pattern: String,
    pub replacement: String,
}

impl RenameRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

/// Inclusion, exclusion, rename and conflict settings for one copy run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CopyRules {
    /// Globs a path must match to be kept. Empty keeps everything.
    pub include: Vec<String>,
    /// Globs that drop matching paths.
    ///
    /// Both lists test each entry's own path. A pattern ending in `/`
    /// (`docs/`) also matches everything beneath the directories it names.
    pub exclude: Vec<String>,
    pub on_conflict: OnConflict,
    /// Rewrites tried in order; the first matching rule applies.
    pub rename: Vec<RenameRule>,
}

impl CopyRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse rules from a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.message().to_string()))
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn rename(mut self, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.rename.push(RenameRule::new(pattern, replacement));
        self
    }

    pub fn on_conflict(mut self, policy: OnConflict) -> Self {
        self.on_conflict = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn parses_full_rule_set() {
        let rules = CopyRules::from_toml(
            r#"
            include = ["src/**"]
            exclude = ["*.md"]
            on_conflict = "skip"

            [[rename]]
            pattern = "^src/(.*)$"
            replacement = "lib/$1"
            "#,
        )
        .unwrap();

        assert_eq!(
            rules,
            CopyRules::new()
                .include("src/**")
                .exclude("*.md")
                .rename("^src/(.*)$", "lib/$1")
                .on_conflict(OnConflict::Skip)
        );
    }

    #[test]
    fn empty_document_uses_defaults() {
        let rules = CopyRules::from_toml("").unwrap();
        assert!(rules.include.is_empty());
        assert_eq!(rules.on_conflict, OnConflict::Overwrite);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = CopyRules::from_toml("includes = []").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[rstest]
    #[case("overwrite", OnConflict::Overwrite)]
    #[case("SKIP", OnConflict::Skip)]
    #[case("fail", OnConflict::Error)]
    fn parses_conflict_policy(#[case] input: &str, #[case] expected: OnConflict) {
        assert_eq!(input.parse::<OnConflict>().unwrap(), expected);
    }

    #[test]
    fn unknown_conflict_policy_fails() {
        assert!("merge".parse::<OnConflict>().is_err());
    }
}
