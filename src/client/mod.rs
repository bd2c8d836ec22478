//! Core library client for repo-sage
//!
//! [`SageClient`] wires the pipeline together: repository loading and
//! indexing, commit polling, question answering, and the credit and
//! archival helpers around them. The MCP server and the CLI are thin
//! wrappers over it.

pub(crate) mod index_lock;

use crate::commits::{CommitLog, CommitPoller, CommitRecord, JsonCommitLog};
use crate::config::Config;
use crate::error::CreditError;
use crate::indexer::{EmbeddingIndexer, IndexerLimits};
use crate::llm::{GeminiClient, LanguageModel, LlmGateway};
use crate::projects::{InMemoryProjectDirectory, ProjectDirectory, ProjectSource};
use crate::qa::{Answer, QuestionAnswerer, RetrievalLimits};
use crate::rate_limit::{RateLimitedExecutor, RetryPolicy};
use crate::repository::{RepositoryFileCounter, RepositoryLoader};
use crate::store::{CodeEmbeddingRecord, LanceVectorStore, VectorStore};
use crate::types::validate_project_id;
use crate::vcs::{GitHubClient, RepoRef, RepositoryHost, RetryingHost};
use anyhow::{Context, Result};
use index_lock::{IndexLockResult, IndexOps, IndexOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// External collaborators of a [`SageClient`]
///
/// [`SageClient::with_config`] builds the production set; tests and
/// embedders can supply their own.
pub struct Components {
    pub host: Arc<dyn RepositoryHost>,
    pub model: Arc<dyn LanguageModel>,
    pub store: Arc<dyn VectorStore>,
    pub commit_log: Arc<dyn CommitLog>,
    pub projects: Arc<dyn ProjectDirectory>,
}

/// Main client for indexing repositories and asking questions about them
///
/// All model calls made through one client share a single rate-limited
/// executor, so summaries and embeddings from concurrent jobs are spaced
/// against the same quota.
///
/// # Example
///
/// ```no_run
/// use repo_sage::SageClient;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = SageClient::new().await?;
///
///     let records = client
///         .create_index("https://github.com/owner/repo", None, "my-project")
///         .await?;
///     println!("Indexed {} files", records.len());
///
///     let answer = client.ask("Where is the entry point?", "my-project").await?;
///     println!("{}", answer.stream.collect_text().await?);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct SageClient {
    pub(crate) config: Arc<Config>,
    store: Arc<dyn VectorStore>,
    commit_log: Arc<dyn CommitLog>,
    projects: Arc<dyn ProjectDirectory>,
    counter: Arc<RepositoryFileCounter>,
    loader: Arc<RepositoryLoader>,
    indexer: Arc<EmbeddingIndexer>,
    poller: Arc<CommitPoller>,
    answerer: Arc<QuestionAnswerer>,
    // In-progress indexing runs, keyed by project id
    indexing_ops: IndexOps,
}

impl SageClient {
    /// Create a client from the default configuration file and environment
    pub async fn new() -> Result<Self> {
        let config = Config::new().context("Failed to load configuration")?;
        Self::with_config(config).await
    }

    /// Create a client backed by Gemini, GitHub, LanceDB and a JSON commit log
    pub async fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        tracing::info!("Initializing repo-sage client");
        tracing::debug!("Generation model: {}", config.llm.generation_model);
        tracing::debug!("Embedding model: {}", config.llm.embedding_model);

        let model = Arc::new(
            GeminiClient::new(&config.llm).context("Failed to initialize language model")?,
        );
        let host = Arc::new(
            GitHubClient::new(&config.vcs).context("Failed to initialize repository host")?,
        );

        tracing::info!(
            "Using LanceDB vector store at {}",
            config.storage.lancedb_path.display()
        );
        let store = Arc::new(LanceVectorStore::new(
            config.storage.lancedb_path.to_string_lossy(),
            config.llm.embedding_dimension,
        ));

        let commit_log = Arc::new(
            JsonCommitLog::open(&config.storage.commit_log_path)
                .context("Failed to open commit log")?,
        );
        tracing::info!(
            "Using commit log file: {:?}",
            config.storage.commit_log_path
        );

        Ok(Self::with_components(
            config,
            Components {
                host,
                model,
                store,
                commit_log,
                projects: Arc::new(InMemoryProjectDirectory::new()),
            },
        ))
    }

    /// Create a client from explicit collaborators
    pub fn with_components(config: Config, components: Components) -> Self {
        let Components {
            host,
            model,
            store,
            commit_log,
            projects,
        } = components;

        let executor = Arc::new(RateLimitedExecutor::new(config.rate_limit.spacing()));
        let retry = RetryPolicy::new(
            config.rate_limit.max_retries,
            config.rate_limit.base_delay(),
        );
        let gateway = LlmGateway::new(model, executor, retry);
        let host: Arc<dyn RepositoryHost> = Arc::new(RetryingHost::new(host, retry));

        let counter = RepositoryFileCounter::new(host.clone(), config.indexing.count_concurrency);
        let loader = RepositoryLoader::new(host.clone(), &config.indexing);
        let indexer = EmbeddingIndexer::new(
            gateway.clone(),
            store.clone(),
            IndexerLimits::from(&config.indexing),
        );
        let poller = CommitPoller::new(
            host,
            gateway.clone(),
            commit_log.clone(),
            projects.clone(),
            config.commits.window,
            config.vcs.quota_warning_ratio,
        );
        let answerer =
            QuestionAnswerer::new(gateway, store.clone(), RetrievalLimits::from(&config.search));

        Self {
            config: Arc::new(config),
            store,
            commit_log,
            projects,
            counter: Arc::new(counter),
            loader: Arc::new(loader),
            indexer: Arc::new(indexer),
            poller: Arc::new(poller),
            answerer: Arc::new(answerer),
            indexing_ops: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load, summarize, embed and store every file of a repository
    ///
    /// Returns the records actually stored; files that failed along the way
    /// are logged and left out. A second call for a project that is already
    /// being indexed waits for the first run and returns its result.
    pub async fn create_index(
        &self,
        repo_url: &str,
        token: Option<String>,
        project_id: &str,
    ) -> Result<Vec<CodeEmbeddingRecord>> {
        validate_project_id(project_id)?;
        // Fail fast on a malformed URL, before taking the lock
        RepoRef::parse(repo_url, token.clone())?;

        let guard = match index_lock::try_acquire(&self.indexing_ops, project_id).await {
            IndexLockResult::Acquired(guard) => guard,
            IndexLockResult::WaitForResult(mut receiver) => {
                return match receiver.recv().await {
                    Ok(outcome) => outcome.map_err(anyhow::Error::msg),
                    Err(e) => Err(anyhow::anyhow!(
                        "Indexing operation failed or was cancelled: {}",
                        e
                    )),
                };
            }
        };

        self.projects
            .remember(
                project_id,
                ProjectSource {
                    repo_url: repo_url.to_string(),
                    access_token: token.clone(),
                },
            )
            .await;

        let result = self.run_index(repo_url, token, project_id).await;
        let outcome: IndexOutcome = match &result {
            Ok(records) => Ok(records.clone()),
            Err(e) => Err(format!("{:#}", e)),
        };
        guard.release(&outcome).await;
        result
    }

    async fn run_index(
        &self,
        repo_url: &str,
        token: Option<String>,
        project_id: &str,
    ) -> Result<Vec<CodeEmbeddingRecord>> {
        let start = std::time::Instant::now();
        self.store
            .acquire()
            .await
            .context("Failed to open vector store")?;

        let result: Result<Vec<CodeEmbeddingRecord>> = async {
            let documents = self.loader.load(repo_url, token).await?;
            Ok(self.indexer.index(project_id, documents).await)
        }
        .await;

        // Released on every path
        self.store.release().await;

        match &result {
            Ok(records) => tracing::info!(
                "Indexed project {} ({} files) in {} ms",
                project_id,
                records.len(),
                start.elapsed().as_millis()
            ),
            Err(e) => tracing::error!("Indexing project {} failed: {:#}", project_id, e),
        }
        result
    }

    /// Summarize and store the project's commits that are not in the log yet
    pub async fn poll_commits(&self, project_id: &str) -> Result<Vec<CommitRecord>> {
        validate_project_id(project_id)?;
        self.poller.poll_commits(project_id).await
    }

    /// Point `project_id` at a repository without indexing it
    pub async fn register_project(
        &self,
        project_id: &str,
        repo_url: &str,
        token: Option<String>,
    ) -> Result<()> {
        validate_project_id(project_id)?;
        RepoRef::parse(repo_url, token.clone())?;
        self.projects
            .remember(
                project_id,
                ProjectSource {
                    repo_url: repo_url.to_string(),
                    access_token: token,
                },
            )
            .await;
        Ok(())
    }

    /// Stored commits of a project, newest first
    pub async fn list_commits(&self, project_id: &str, limit: usize) -> Result<Vec<CommitRecord>> {
        validate_project_id(project_id)?;
        Ok(self.commit_log.recent(project_id, limit).await?)
    }

    /// Stream an answer to `question` grounded on the project's indexed files
    pub async fn ask(&self, question: &str, project_id: &str) -> Result<Answer> {
        validate_project_id(project_id)?;
        self.answerer.answer(question, project_id).await
    }

    /// Number of files in a repository, one credit each
    pub async fn estimate_file_count(
        &self,
        repo_url: &str,
        token: Option<String>,
    ) -> Result<usize> {
        let repo = RepoRef::parse(repo_url, token)?;
        let count = self
            .counter
            .count_files(&repo, "")
            .await
            .with_context(|| format!("Failed to count files of {}", repo.slug()))?;
        tracing::info!("{} has {} files", repo.slug(), count);
        Ok(count)
    }

    /// Check that `available` credits cover indexing the repository
    ///
    /// Returns the credits required. Nothing is deducted here.
    pub async fn check_credits(
        &self,
        available: u64,
        repo_url: &str,
        token: Option<String>,
    ) -> Result<u64> {
        let required = self.estimate_file_count(repo_url, token).await? as u64;
        if required > available {
            return Err(CreditError::Insufficient {
                required,
                available,
            }
            .into());
        }
        Ok(required)
    }

    /// Delete every indexed file of a project
    pub async fn archive_project(&self, project_id: &str) -> Result<usize> {
        validate_project_id(project_id)?;
        let deleted = self
            .store
            .delete_project(project_id)
            .await
            .with_context(|| format!("Failed to archive project {}", project_id))?;
        tracing::info!("Archived project {} ({} records)", project_id, deleted);
        Ok(deleted)
    }

    /// Run [`create_index`](Self::create_index) as a background task
    pub fn spawn_create_index(
        &self,
        repo_url: String,
        token: Option<String>,
        project_id: String,
    ) -> JoinHandle<Result<Vec<CodeEmbeddingRecord>>> {
        let client = self.clone();
        tokio::spawn(async move { client.create_index(&repo_url, token, &project_id).await })
    }

    /// Run [`poll_commits`](Self::poll_commits) as a background task
    pub fn spawn_poll_commits(&self, project_id: String) -> JoinHandle<Result<Vec<CommitRecord>>> {
        let client = self.clone();
        tokio::spawn(async move { client.poll_commits(&project_id).await })
    }
}
