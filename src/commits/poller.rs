use super::{CommitLog, CommitRecord, UNKNOWN_AUTHOR, parse_date};
use crate::llm::LlmGateway;
use crate::projects::ProjectDirectory;
use crate::vcs::{RemoteCommit, RepoRef, RepositoryHost};
use anyhow::{Context, Result};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

/// Brings a project's commit log up to date with its repository
pub struct CommitPoller {
    host: Arc<dyn RepositoryHost>,
    gateway: LlmGateway,
    log: Arc<dyn CommitLog>,
    projects: Arc<dyn ProjectDirectory>,
    /// Commits fetched per poll, and stored commits they are compared against
    window: usize,
    quota_warning_ratio: f64,
}

impl CommitPoller {
    pub fn new(
        host: Arc<dyn RepositoryHost>,
        gateway: LlmGateway,
        log: Arc<dyn CommitLog>,
        projects: Arc<dyn ProjectDirectory>,
        window: usize,
        quota_warning_ratio: f64,
    ) -> Self {
        Self {
            host,
            gateway,
            log,
            projects,
            window: window.max(1),
            quota_warning_ratio,
        }
    }

    /// Summarize and store the project's new commits, returning the records inserted
    pub async fn poll_commits(&self, project_id: &str) -> Result<Vec<CommitRecord>> {
        let source = self.projects.resolve(project_id).await?;
        let repo = RepoRef::parse(&source.repo_url, source.access_token)?;

        self.check_quota(&repo).await;

        let mut remote = self
            .host
            .list_commits(&repo, self.window)
            .await
            .with_context(|| format!("Failed to list commits of {}", repo.slug()))?;
        sort_newest_first(&mut remote);

        let known: HashSet<String> = self
            .log
            .recent(project_id, self.window)
            .await
            .context("Failed to read the commit log")?
            .into_iter()
            .map(|c| c.commit_hash)
            .collect();
        let unprocessed: Vec<RemoteCommit> = remote
            .into_iter()
            .filter(|c| !known.contains(&c.sha))
            .collect();

        if unprocessed.is_empty() {
            tracing::debug!("No new commits for project {}", project_id);
            return Ok(Vec::new());
        }
        tracing::info!(
            "Summarizing {} new commits for project {}",
            unprocessed.len(),
            project_id
        );

        let summaries = join_all(unprocessed.iter().map(|c| self.summarize(&repo, &c.sha))).await;
        let records: Vec<CommitRecord> = unprocessed
            .into_iter()
            .zip(summaries)
            .map(|(commit, summary)| to_record(project_id, commit, summary))
            .collect();

        let inserted = self
            .log
            .insert_many(&records)
            .await
            .context("Failed to store commit summaries")?;
        tracing::info!(
            "Stored {} of {} commit summaries for project {}",
            inserted.len(),
            records.len(),
            project_id
        );
        Ok(inserted)
    }

    /// Diff summary of one commit; empty when the diff or the model fails
    async fn summarize(&self, repo: &RepoRef, sha: &str) -> String {
        let diff = match self.host.commit_diff(repo, sha).await {
            Ok(diff) => diff,
            Err(e) => {
                tracing::warn!("Failed to fetch diff of {}: {}", sha, e);
                return String::new();
            }
        };

        match self.gateway.summarize_diff(&diff).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => {
                tracing::warn!("Failed to summarize commit {}: {}", sha, e);
                String::new()
            }
        }
    }

    async fn check_quota(&self, repo: &RepoRef) {
        match self.host.rate_limit(repo).await {
            Ok(quota) => {
                tracing::debug!(
                    "Repository host quota: {}/{} remaining, resets at {}",
                    quota.remaining,
                    quota.limit,
                    quota.reset
                );
                if quota.remaining_ratio() < self.quota_warning_ratio {
                    tracing::warn!(
                        "Repository host quota is low: {} of {} requests left",
                        quota.remaining,
                        quota.limit
                    );
                }
            }
            Err(e) => tracing::debug!("Could not read repository host quota: {}", e),
        }
    }
}

/// Newest first by author date; commits without a usable date keep their
/// relative order after the dated ones
fn sort_newest_first(commits: &mut [RemoteCommit]) {
    commits.sort_by_cached_key(|c| {
        std::cmp::Reverse(c.author_date.as_deref().and_then(parse_date))
    });
}

fn to_record(project_id: &str, commit: RemoteCommit, summary: String) -> CommitRecord {
    CommitRecord {
        id: CommitRecord::commit_id(project_id, &commit.sha),
        project_id: project_id.to_string(),
        commit_hash: commit.sha,
        commit_message: commit.message,
        commit_author: commit
            .author_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        commit_author_avatar: commit.author_avatar.unwrap_or_default(),
        commit_date: commit.author_date.unwrap_or_default(),
        summary,
    }
}
