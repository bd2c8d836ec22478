use super::{Document, IgnoreFilter, decode_text};
use crate::config::IndexingConfig;
use crate::error::VcsError;
use crate::vcs::{EntryKind, RepoRef, RepositoryHost};
use futures::FutureExt;
use futures::future::{BoxFuture, join_all, try_join_all};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Loads every text document of a repository from the first branch that has any
pub struct RepositoryLoader {
    host: Arc<dyn RepositoryHost>,
    branches: Vec<String>,
    filter: IgnoreFilter,
    concurrency: usize,
}

impl RepositoryLoader {
    pub fn new(host: Arc<dyn RepositoryHost>, config: &IndexingConfig) -> Self {
        Self {
            host,
            branches: config.candidate_branches.clone(),
            filter: IgnoreFilter::new(&config.ignore_patterns),
            concurrency: config.fetch_concurrency.max(1),
        }
    }

    /// Load all documents of `repo_url`
    ///
    /// Candidate branches are tried in order and the first one yielding at
    /// least one document wins. Later branches are never contacted.
    pub async fn load(
        &self,
        repo_url: &str,
        token: Option<String>,
    ) -> Result<Vec<Document>, VcsError> {
        let repo = RepoRef::parse(repo_url, token)?;

        for branch in &self.branches {
            match self.load_branch(&repo, branch).await {
                Ok(docs) if !docs.is_empty() => {
                    tracing::info!(
                        "Loaded {} documents from {} (branch: {})",
                        docs.len(),
                        repo.slug(),
                        branch
                    );
                    return Ok(docs);
                }
                Ok(_) => {
                    tracing::warn!("Branch {} of {} has no documents", branch, repo.slug());
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to load {} from branch {}: {}",
                        repo.slug(),
                        branch,
                        e
                    );
                }
            }
        }

        Err(VcsError::RepositoryUnreachable {
            url: repo_url.to_string(),
        })
    }

    async fn load_branch(&self, repo: &RepoRef, branch: &str) -> Result<Vec<Document>, VcsError> {
        let permits = Semaphore::new(self.concurrency);
        let paths = self
            .collect_paths(repo, branch, String::new(), &permits)
            .await?;
        tracing::debug!("Branch {} lists {} candidate files", branch, paths.len());

        let fetches = paths.into_iter().map(|path| {
            let permits = &permits;
            async move {
                let result = match permits.acquire().await {
                    Ok(_permit) => self.host.fetch_file(repo, &path, Some(branch)).await,
                    Err(e) => Err(VcsError::Transport(e.to_string())),
                };
                (path, result)
            }
        });

        let mut docs = Vec::new();
        for (path, result) in join_all(fetches).await {
            match result {
                Ok(bytes) => {
                    let size_bytes = bytes.len() as u64;
                    match decode_text(bytes) {
                        Some(content) => docs.push(Document {
                            path,
                            content,
                            size_bytes,
                        }),
                        None => tracing::warn!("Skipping non-text file: {}", path),
                    }
                }
                Err(e) => tracing::warn!("Failed to fetch {}: {}", path, e),
            }
        }
        Ok(docs)
    }

    fn collect_paths<'a>(
        &'a self,
        repo: &'a RepoRef,
        branch: &'a str,
        path: String,
        permits: &'a Semaphore,
    ) -> BoxFuture<'a, Result<Vec<String>, VcsError>> {
        async move {
            let entries = {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|e| VcsError::Transport(e.to_string()))?;
                self.host.list_directory(repo, &path, Some(branch)).await?
            };

            let mut files = Vec::new();
            let mut subdirs = Vec::new();
            for entry in entries {
                match entry.kind {
                    EntryKind::File if !self.filter.is_ignored(&entry.path) => {
                        files.push(entry.path)
                    }
                    EntryKind::Dir if !self.filter.is_ignored_dir(&entry.path) => {
                        subdirs.push(self.collect_paths(repo, branch, entry.path, permits))
                    }
                    _ => {}
                }
            }

            for nested in try_join_all(subdirs).await? {
                files.extend(nested);
            }
            Ok(files)
        }
        .boxed()
    }
}
