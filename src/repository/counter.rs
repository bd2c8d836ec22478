use crate::error::VcsError;
use crate::vcs::{EntryKind, RepoRef, RepositoryHost};
use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Counts every file reachable from a directory of a remote repository
///
/// Sibling directories are walked concurrently. At most `concurrency`
/// listing requests are in flight at once; a permit is held only for the
/// listing call itself so parents waiting on children never starve them.
pub struct RepositoryFileCounter {
    host: Arc<dyn RepositoryHost>,
    concurrency: usize,
}

impl RepositoryFileCounter {
    pub fn new(host: Arc<dyn RepositoryHost>, concurrency: usize) -> Self {
        Self {
            host,
            concurrency: concurrency.max(1),
        }
    }

    /// Total number of files under `path` (`""` for the whole repository)
    ///
    /// Any failed listing aborts the count.
    pub async fn count_files(&self, repo: &RepoRef, path: &str) -> Result<usize, VcsError> {
        let permits = Semaphore::new(self.concurrency);
        let total = self.count_dir(repo, path.to_string(), &permits).await?;
        tracing::info!("Counted {} files in {}", total, repo.slug());
        Ok(total)
    }

    fn count_dir<'a>(
        &'a self,
        repo: &'a RepoRef,
        path: String,
        permits: &'a Semaphore,
    ) -> BoxFuture<'a, Result<usize, VcsError>> {
        async move {
            let entries = {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|e| VcsError::Transport(e.to_string()))?;
                self.host.list_directory(repo, &path, None).await?
            };

            let mut files = 0usize;
            let mut subdirs = Vec::new();
            for entry in entries {
                match entry.kind {
                    EntryKind::File => files += 1,
                    EntryKind::Dir => subdirs.push(self.count_dir(repo, entry.path, permits)),
                    EntryKind::Other => {}
                }
            }

            let nested = try_join_all(subdirs).await?;
            Ok(files + nested.into_iter().sum::<usize>())
        }
        .boxed()
    }
}
