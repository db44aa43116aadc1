//! Registry dependencies

use std::sync::Arc;

use async_trait::async_trait;
use deps_tree::{DependencySpec, SourceKind};

use crate::fetch::{FetchError, FetchErrorKind, FetchedSource, RegistryClient};
use crate::resolver::{FetchStrategy, Selection};
use crate::version::VersionConstraint;

/// Strategy for [`SourceKind::Registry`] specs.
///
/// The highest published version satisfying the constraint is selected
/// before the cache is consulted, so `^1.0` and `~1.2` that both select
/// `1.2.3` share one tree.
pub struct RegistryStrategy {
    client: Arc<dyn RegistryClient>,
}

impl RegistryStrategy {
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchStrategy for RegistryStrategy {
    fn name(&self) -> &str {
        "registry"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Registry
    }

    fn identifier(&self, spec: &DependencySpec) -> String {
        spec.location().trim().to_ascii_lowercase()
    }

    async fn select(&self, spec: &DependencySpec, identifier: &str) -> Result<Selection, FetchError> {
        let constraint = VersionConstraint::parse(spec.constraint())
            .map_err(|e| FetchError::new(FetchErrorKind::InvalidReference, e.to_string()))?;
        let versions = self.client.versions(identifier).await?;

        let selected = constraint.best_match(&versions).ok_or_else(|| {
            FetchError::new(
                FetchErrorKind::NoMatchingVersion,
                format!(
                    "{identifier}: none of {} published versions satisfies '{constraint}'",
                    versions.len()
                ),
            )
        })?;
        tracing::debug!(package = identifier, %constraint, version = %selected, "Selected version");
        Ok(Selection::resolved(selected))
    }

    fn accepts(&self, spec: &DependencySpec, resolved_version: &str) -> bool {
        VersionConstraint::parse(spec.constraint()).is_ok_and(|c| c.satisfies(resolved_version))
    }

    async fn fetch(
        &self,
        _spec: &DependencySpec,
        identifier: &str,
        selection: &Selection,
    ) -> Result<FetchedSource, FetchError> {
        self.client.download(identifier, &selection.version).await
    }
}
