//! Version-controlled dependencies

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use deps_fs::checksum::hex_digest;
use deps_tree::{DependencySpec, SourceKind};
use git2::{ObjectType, Oid, Repository, TreeWalkMode, TreeWalkResult};

use crate::fetch::{FetchError, FetchErrorKind, FetchedEntry, FetchedSource, Fetcher};
use crate::local::normalize_local_path;
use crate::resolver::{FetchStrategy, Selection};

const SYMLINK_FILEMODE: i32 = 0o120000;

/// Strategy for [`SourceKind::VersionControl`] specs.
///
/// The ref in the spec's constraint is resolved to a commit id first, so two
/// refs pointing at the same commit share one cache entry.
pub struct GitStrategy {
    fetcher: Arc<dyn Fetcher>,
}

impl GitStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl FetchStrategy for GitStrategy {
    fn name(&self) -> &str {
        "git"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::VersionControl
    }

    fn identifier(&self, spec: &DependencySpec) -> String {
        normalize_git_url(spec.location())
    }

    async fn select(&self, spec: &DependencySpec, identifier: &str) -> Result<Selection, FetchError> {
        let commit = self
            .fetcher
            .resolve_version(identifier, spec.constraint())
            .await?;
        Ok(Selection::resolved(commit))
    }

    fn accepts(&self, spec: &DependencySpec, resolved_version: &str) -> bool {
        !is_full_commit_id(spec.constraint()) || spec.constraint().eq_ignore_ascii_case(resolved_version)
    }

    async fn fetch(
        &self,
        _spec: &DependencySpec,
        identifier: &str,
        selection: &Selection,
    ) -> Result<FetchedSource, FetchError> {
        self.fetcher.fetch(identifier, &selection.version).await
    }
}

fn is_full_commit_id(reference: &str) -> bool {
    reference.len() == 40 && reference.chars().all(|c| c.is_ascii_hexdigit())
}

/// Canonical form of a repository location.
///
/// - `"HTTPS://GitHub.com/org/repo.git/"` -> `"https://github.com/org/repo"`
/// - `"git@GitHub.com:org/repo.git"` -> `"git@github.com:org/repo"`
/// - `"./repos/a/"` -> `"repos/a"`
pub fn normalize_git_url(location: &str) -> String {
    let trimmed = location.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');

    if let Some((scheme, rest)) = trimmed.split_once("://") {
        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        let authority = match authority.rsplit_once('@') {
            Some((user, host)) => format!("{user}@{}", host.to_ascii_lowercase()),
            None => authority.to_ascii_lowercase(),
        };
        return format!("{}://{authority}{path}", scheme.to_ascii_lowercase());
    }

    if let Some((user_host, path)) = trimmed.split_once(':') {
        if let Some((user, host)) = user_host.split_once('@') {
            if !host.contains('/') {
                return format!("{user}@{}:{path}", host.to_ascii_lowercase());
            }
        }
    }

    normalize_local_path(trimmed)
}

fn git_err(context: &str) -> impl Fn(git2::Error) -> FetchError + '_ {
    move |e| {
        let kind = match e.code() {
            git2::ErrorCode::NotFound => FetchErrorKind::NotFound,
            _ => FetchErrorKind::Transport,
        };
        FetchError::new(kind, format!("{context}: {}", e.message()))
    }
}

/// Fetches repositories with `git2`.
///
/// Local repository paths are opened in place. Remote URLs are cloned bare
/// into `checkout_root` once and fetched again on later lookups.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    checkout_root: PathBuf,
    clone_lock: Arc<Mutex<()>>,
}

impl GitFetcher {
    pub fn new(checkout_root: impl Into<PathBuf>) -> Self {
        Self {
            checkout_root: checkout_root.into(),
            clone_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn checkout_root(&self) -> &Path {
        &self.checkout_root
    }

    fn open(&self, url: &str, refresh: bool) -> Result<Repository, FetchError> {
        let local = Path::new(url);
        if !url.contains("://") && local.is_dir() {
            return Repository::open(local).map_err(git_err(url));
        }

        let _guard = self.clone_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let digest = hex_digest(url.as_bytes());
        let dest = self.checkout_root.join(&digest[..16]);

        if dest.exists() {
            let repo = Repository::open_bare(&dest).map_err(git_err(url))?;
            if refresh {
                {
                    let mut remote = repo.find_remote("origin").map_err(git_err(url))?;
                    remote
                        .fetch(
                            &["+refs/heads/*:refs/remotes/origin/*", "+refs/tags/*:refs/tags/*"],
                            None,
                            None,
                        )
                        .map_err(git_err(url))?;
                }
                tracing::debug!(url, "Fetched repository");
            }
            return Ok(repo);
        }

        tracing::info!(url, dest = %dest.display(), "Cloning repository");
        git2::build::RepoBuilder::new()
            .bare(true)
            .clone(url, &dest)
            .map_err(git_err(url))
    }

    fn resolve_blocking(&self, url: &str, reference: &str) -> Result<String, FetchError> {
        let repo = self.open(url, true)?;
        let candidates = [
            reference.to_string(),
            format!("origin/{reference}"),
            format!("refs/tags/{reference}"),
        ];

        for candidate in &candidates {
            if let Ok(object) = repo.revparse_single(candidate) {
                let commit = object.peel_to_commit().map_err(git_err(url))?;
                return Ok(commit.id().to_string());
            }
        }

        Err(FetchError::new(
            FetchErrorKind::InvalidReference,
            format!("{url}: no commit for ref '{reference}'"),
        ))
    }

    fn fetch_blocking(&self, url: &str, commit_id: &str) -> Result<FetchedSource, FetchError> {
        let repo = self.open(url, false)?;
        let oid = Oid::from_str(commit_id).map_err(|e| {
            FetchError::new(FetchErrorKind::InvalidReference, format!("{commit_id}: {}", e.message()))
        })?;
        let commit = repo.find_commit(oid).map_err(git_err(url))?;
        let tree = commit.tree().map_err(git_err(url))?;

        let mut entries = Vec::new();
        let mut failure = None;
        let walked = tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            let Some(name) = entry.name() else {
                return TreeWalkResult::Skip;
            };
            let path = format!("{root}{name}");

            match entry.kind() {
                Some(ObjectType::Tree) => entries.push(FetchedEntry::directory(path)),
                Some(ObjectType::Blob) => match repo.find_blob(entry.id()) {
                    Ok(blob) if entry.filemode() == SYMLINK_FILEMODE => {
                        let target = String::from_utf8_lossy(blob.content()).into_owned();
                        entries.push(FetchedEntry::symlink(path, target));
                    }
                    Ok(blob) => entries.push(FetchedEntry::file(path, blob.content().to_vec())),
                    Err(e) => {
                        failure = Some(git_err(url)(e));
                        return TreeWalkResult::Abort;
                    }
                },
                // Submodules are not followed
                _ => return TreeWalkResult::Skip,
            }
            TreeWalkResult::Ok
        });

        if let Some(e) = failure {
            return Err(e);
        }
        walked.map_err(git_err(url))?;

        tracing::debug!(url, commit = commit_id, entries = entries.len(), "Read commit tree");
        Ok(FetchedSource::new(entries))
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    async fn resolve_version(&self, identifier: &str, constraint: &str) -> Result<String, FetchError> {
        let fetcher = self.clone();
        let url = identifier.to_string();
        let reference = constraint.to_string();
        tokio::task::spawn_blocking(move || fetcher.resolve_blocking(&url, &reference))
            .await
            .map_err(|e| FetchError::transport(format!("git task failed: {e}")))?
    }

    async fn fetch(&self, identifier: &str, version: &str) -> Result<FetchedSource, FetchError> {
        let fetcher = self.clone();
        let url = identifier.to_string();
        let commit = version.to_string();
        tokio::task::spawn_blocking(move || fetcher.fetch_blocking(&url, &commit))
            .await
            .map_err(|e| FetchError::transport(format!("git task failed: {e}")))?
    }
}
