use super::{RateLimitStatus, RemoteCommit, RepoEntry, RepoRef, RepositoryHost};
use crate::error::VcsError;
use crate::rate_limit::{RetryPolicy, retry_with_backoff};
use std::sync::Arc;

/// [`RepositoryHost`] that retries rate-limited requests with backoff
///
/// The quota probe is passed through untouched, it is informational only.
pub struct RetryingHost {
    inner: Arc<dyn RepositoryHost>,
    policy: RetryPolicy,
}

impl RetryingHost {
    pub fn new(inner: Arc<dyn RepositoryHost>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait::async_trait]
impl RepositoryHost for RetryingHost {
    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Vec<RepoEntry>, VcsError> {
        retry_with_backoff(&self.policy, || self.inner.list_directory(repo, path, branch))
            .await
            .map_err(|e| e.into_inner())
    }

    async fn fetch_file(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Vec<u8>, VcsError> {
        retry_with_backoff(&self.policy, || self.inner.fetch_file(repo, path, branch))
            .await
            .map_err(|e| e.into_inner())
    }

    async fn list_commits(
        &self,
        repo: &RepoRef,
        per_page: usize,
    ) -> Result<Vec<RemoteCommit>, VcsError> {
        retry_with_backoff(&self.policy, || self.inner.list_commits(repo, per_page))
            .await
            .map_err(|e| e.into_inner())
    }

    async fn commit_diff(&self, repo: &RepoRef, sha: &str) -> Result<String, VcsError> {
        retry_with_backoff(&self.policy, || self.inner.commit_diff(repo, sha))
            .await
            .map_err(|e| e.into_inner())
    }

    async fn rate_limit(&self, repo: &RepoRef) -> Result<RateLimitStatus, VcsError> {
        self.inner.rate_limit(repo).await
    }
}
