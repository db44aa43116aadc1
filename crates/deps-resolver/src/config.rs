//! Resolver configuration
//!
//! ```toml
//! strategies = ["local", "git", "registry"]
//! manifest_file = "deps.toml"
//! cache_dir = ".deps-cache"
//! max_concurrency = 8
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use deps_tree::SourceKind;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::manifest::MANIFEST_FILENAME;
use crate::resolver::DEFAULT_MAX_CONCURRENCY;

/// A resolver strategy that can be listed in [`ResolverConfig::strategies`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Local,
    Git,
    Registry,
}

impl StrategyKind {
    /// The spec source kind handled by this strategy.
    pub fn source_kind(&self) -> SourceKind {
        match self {
            StrategyKind::Local => SourceKind::LocalPath,
            StrategyKind::Git => SourceKind::VersionControl,
            StrategyKind::Registry => SourceKind::Registry,
        }
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "path" => Ok(StrategyKind::Local),
            "git" | "vcs" => Ok(StrategyKind::Git),
            "registry" => Ok(StrategyKind::Registry),
            _ => Err(Error::Config {
                message: format!("unknown strategy '{s}'"),
            }),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Local => write!(f, "local"),
            StrategyKind::Git => write!(f, "git"),
            StrategyKind::Registry => write!(f, "registry"),
        }
    }
}

/// Settings for building a [`MultiResolver`](crate::MultiResolver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Dispatch order; the first strategy accepting a spec resolves it.
    pub strategies: Vec<StrategyKind>,
    /// Manifest filename looked up at the root of each fetched dependency.
    pub manifest_file: String,
    /// Directory for persisted cache entries. `None` keeps the cache in
    /// memory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Nested dependencies of one tree resolved at once.
    pub max_concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategies: vec![StrategyKind::Local, StrategyKind::Git, StrategyKind::Registry],
            manifest_file: MANIFEST_FILENAME.to_string(),
            cache_dir: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl ResolverConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config {
            message: e.to_string(),
        })
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(Error::Config { message });

        if self.strategies.is_empty() {
            return fail("at least one strategy is required".to_string());
        }
        for (idx, kind) in self.strategies.iter().enumerate() {
            if self.strategies[..idx].contains(kind) {
                return fail(format!("strategy '{kind}' is listed twice"));
            }
        }
        if self.manifest_file.trim().is_empty() || self.manifest_file.contains(['/', '\\']) {
            return fail(format!(
                "manifest_file must be a plain file name, got '{}'",
                self.manifest_file
            ));
        }
        if self.max_concurrency == 0 {
            return fail("max_concurrency must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn empty_document_gives_defaults() {
        let config = ResolverConfig::from_toml("").unwrap();
        assert_eq!(config, ResolverConfig::default());
        assert_eq!(config.manifest_file, "deps.toml");
        assert_eq!(config.max_concurrency, 8);
    }

    #[test]
    fn parses_full_document() {
        let config = ResolverConfig::from_toml(
            r#"
            strategies = ["registry", "local"]
            manifest_file = "vendor.toml"
            cache_dir = ".deps-cache"
            max_concurrency = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.strategies, vec![StrategyKind::Registry, StrategyKind::Local]);
        assert_eq!(config.manifest_file, "vendor.toml");
        assert_eq!(config.cache_dir, Some(PathBuf::from(".deps-cache")));
        assert_eq!(config.max_concurrency, 2);
    }

    #[test]
    fn serializes_back_to_toml() {
        let config = ResolverConfig {
            cache_dir: Some(PathBuf::from("cache")),
            ..ResolverConfig::default()
        };
        let text = config.to_toml().unwrap();
        assert_eq!(ResolverConfig::from_toml(&text).unwrap(), config);
    }

    #[rstest]
    #[case("strategies = []")]
    #[case("strategies = [\"git\", \"git\"]")]
    #[case("strategies = [\"ftp\"]")]
    #[case("manifest_file = \"sub/deps.toml\"")]
    #[case("max_concurrency = 0")]
    #[case("unknown_key = 1")]
    fn rejects_invalid_documents(#[case] input: &str) {
        assert!(matches!(
            ResolverConfig::from_toml(input),
            Err(Error::Config { .. })
        ));
    }

    #[rstest]
    #[case("local", StrategyKind::Local)]
    #[case("VCS", StrategyKind::Git)]
    #[case("registry", StrategyKind::Registry)]
    fn strategy_kind_from_str(#[case] input: &str, #[case] expected: StrategyKind) {
        assert_eq!(input.parse::<StrategyKind>().unwrap(), expected);
        assert_eq!(expected.to_string().parse::<StrategyKind>().unwrap(), expected);
    }
}
