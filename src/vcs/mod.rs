//! Remote repository host access
//!
//! The pipeline only needs a handful of read operations from the host:
//! directory listings, raw file contents, recent commits, commit diffs and
//! the remaining API quota. [`RepositoryHost`] names exactly those, and
//! [`GitHubClient`] implements them over the GitHub REST API.

/// GitHub REST implementation of [`RepositoryHost`]
pub mod github;
mod retrying;

pub use github::GitHubClient;
pub use retrying::RetryingHost;

use crate::error::VcsError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static REPO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?github\.com/([^/\s]+)/([^/\s?#]+?)(?:\.git)?/?$")
        .expect("repository URL pattern is valid")
});

/// A repository on the remote host plus the credential used to read it
#[derive(Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub access_token: Option<String>,
}

impl RepoRef {
    /// Parse `https://github.com/<owner>/<repo>` (optionally ending in `.git`)
    pub fn parse(url: &str, access_token: Option<String>) -> Result<Self, VcsError> {
        let caps = REPO_URL
            .captures(url.trim())
            .ok_or_else(|| VcsError::InvalidUrl(url.to_string()))?;

        Ok(Self {
            owner: caps[1].to_string(),
            name: caps[2].to_string(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// `owner/name`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Debug for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoRef")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    #[serde(other)]
    Other,
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEntry {
    /// Path from the repository root
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub size: u64,
}

/// Commit metadata as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommit {
    pub sha: String,
    pub message: String,
    pub author_name: Option<String>,
    pub author_avatar: Option<String>,
    /// RFC 3339 author date
    pub author_date: Option<String>,
}

/// Remaining API quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub limit: u64,
    pub remaining: u64,
    /// Unix time at which the quota resets
    pub reset: i64,
}

impl RateLimitStatus {
    pub fn remaining_ratio(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        self.remaining as f64 / self.limit as f64
    }
}

/// Read access to a remote repository host
#[async_trait::async_trait]
pub trait RepositoryHost: Send + Sync {
    /// List the entries of a directory (`""` is the repository root)
    ///
    /// `branch` of `None` reads the host's default branch.
    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Vec<RepoEntry>, VcsError>;

    /// Fetch the raw bytes of one file
    async fn fetch_file(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Vec<u8>, VcsError>;

    /// Most recent commits on the default branch, at most `per_page`
    async fn list_commits(
        &self,
        repo: &RepoRef,
        per_page: usize,
    ) -> Result<Vec<RemoteCommit>, VcsError>;

    /// Unified diff of one commit against its parent
    async fn commit_diff(&self, repo: &RepoRef, sha: &str) -> Result<String, VcsError>;

    /// Remaining API quota for the credential in `repo`
    async fn rate_limit(&self, repo: &RepoRef) -> Result<RateLimitStatus, VcsError>;
}
