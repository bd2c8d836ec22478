use super::{RateLimitStatus, RemoteCommit, RepoEntry, RepoRef, RepositoryHost};
use crate::config::VcsConfig;
use crate::error::VcsError;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";

/// GitHub REST API client
///
/// A token on the [`RepoRef`] takes precedence over the configured
/// fallback token.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: Url,
    fallback_token: Option<String>,
}

impl GitHubClient {
    pub fn new(config: &VcsConfig) -> Result<Self, VcsError> {
        let mut api_url = Url::parse(config.api_url.trim_end_matches('/'))
            .map_err(|e| VcsError::InvalidUrl(format!("{}: {}", config.api_url, e)))?;
        if api_url.cannot_be_a_base() {
            return Err(VcsError::InvalidUrl(config.api_url.clone()));
        }
        // Path segments are appended, so the root must not end in an empty segment
        if let Ok(mut segments) = api_url.path_segments_mut() {
            segments.pop_if_empty();
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("repo-sage/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| VcsError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url,
            fallback_token: config
                .token
                .as_ref()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, VcsError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| VcsError::InvalidUrl(self.api_url.to_string()))?
            .extend(segments.iter().filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn repo_url(&self, repo: &RepoRef, rest: &[&str]) -> Result<Url, VcsError> {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }

    fn contents_url(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Url, VcsError> {
        let mut rest = vec!["contents"];
        rest.extend(path.split('/'));
        let mut url = self.repo_url(repo, &rest)?;
        if let Some(branch) = branch {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        Ok(url)
    }

    async fn get(
        &self,
        repo: &RepoRef,
        url: Url,
        accept: &'static str,
    ) -> Result<reqwest::Response, VcsError> {
        tracing::debug!("GET {}", url);

        let mut request = self.client.get(url.clone()).header(ACCEPT, accept);
        if let Some(token) = repo
            .access_token
            .as_deref()
            .or(self.fallback_token.as_deref())
        {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| VcsError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let quota_exhausted = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0");
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());

        Err(status_error(status, quota_exhausted, url.path(), message))
    }
}

fn status_error(
    status: StatusCode,
    quota_exhausted: bool,
    path: &str,
    message: String,
) -> VcsError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => VcsError::RateLimited {
            status: status.as_u16(),
        },
        StatusCode::FORBIDDEN if quota_exhausted => VcsError::RateLimited {
            status: status.as_u16(),
        },
        StatusCode::NOT_FOUND => VcsError::NotFound(path.to_string()),
        _ => VcsError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    sha: String,
    commit: CommitDetail,
    author: Option<UserInfo>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    message: String,
    author: Option<GitSignature>,
}

#[derive(Debug, Deserialize)]
struct GitSignature {
    name: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    avatar_url: Option<String>,
}

impl From<CommitItem> for RemoteCommit {
    fn from(item: CommitItem) -> Self {
        let (author_name, author_date) = match item.commit.author {
            Some(sig) => (sig.name, sig.date),
            None => (None, None),
        };
        Self {
            sha: item.sha,
            message: item.commit.message,
            author_name,
            author_avatar: item.author.and_then(|a| a.avatar_url),
            author_date,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    rate: RateLimitStatus,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<RepoEntry>),
    Single(RepoEntry),
}

#[async_trait::async_trait]
impl RepositoryHost for GitHubClient {
    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Vec<RepoEntry>, VcsError> {
        let url = self.contents_url(repo, path, branch)?;
        let response = self.get(repo, url, JSON_MEDIA_TYPE).await?;

        match response
            .json::<ContentsResponse>()
            .await
            .map_err(|e| VcsError::InvalidResponse(e.to_string()))?
        {
            ContentsResponse::Listing(entries) => Ok(entries),
            ContentsResponse::Single(entry) => Err(VcsError::InvalidResponse(format!(
                "'{}' is not a directory",
                entry.path
            ))),
        }
    }

    async fn fetch_file(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Vec<u8>, VcsError> {
        let url = self.contents_url(repo, path, branch)?;
        let bytes = self
            .get(repo, url, RAW_MEDIA_TYPE)
            .await?
            .bytes()
            .await
            .map_err(|e| VcsError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn list_commits(
        &self,
        repo: &RepoRef,
        per_page: usize,
    ) -> Result<Vec<RemoteCommit>, VcsError> {
        let mut url = self.repo_url(repo, &["commits"])?;
        url.query_pairs_mut()
            .append_pair("per_page", &per_page.to_string());

        let items: Vec<CommitItem> = self
            .get(repo, url, JSON_MEDIA_TYPE)
            .await?
            .json()
            .await
            .map_err(|e| VcsError::InvalidResponse(e.to_string()))?;

        Ok(items.into_iter().map(RemoteCommit::from).collect())
    }

    async fn commit_diff(&self, repo: &RepoRef, sha: &str) -> Result<String, VcsError> {
        let url = self.repo_url(repo, &["commits", sha])?;
        self.get(repo, url, DIFF_MEDIA_TYPE)
            .await?
            .text()
            .await
            .map_err(|e| VcsError::Transport(e.to_string()))
    }

    async fn rate_limit(&self, repo: &RepoRef) -> Result<RateLimitStatus, VcsError> {
        let url = self.url(&["rate_limit"])?;
        let parsed: RateLimitResponse = self
            .get(repo, url, JSON_MEDIA_TYPE)
            .await?
            .json()
            .await
            .map_err(|e| VcsError::InvalidResponse(e.to_string()))?;
        Ok(parsed.rate)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url.as_str())
            .field(
                "fallback_token",
                &self.fallback_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
