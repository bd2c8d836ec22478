//! Scripted repository host and language model for integration tests
#![allow(dead_code)]

use repo_sage::commits::JsonCommitLog;
use repo_sage::config::Config;
use repo_sage::error::{LlmError, VcsError};
use repo_sage::llm::{LanguageModel, TextStream};
use repo_sage::projects::InMemoryProjectDirectory;
use repo_sage::store::VectorStore;
use repo_sage::vcs::{
    EntryKind, RateLimitStatus, RemoteCommit, RepoEntry, RepoRef, RepositoryHost,
};
use repo_sage::{Components, SageClient};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const REPO: &str = "https://github.com/acme/widgets";
pub const DIMENSION: usize = 16;

/// Host serving fixed file trees per branch and a fixed commit list
#[derive(Default)]
pub struct ScriptedHost {
    trees: HashMap<String, BTreeMap<String, String>>,
    pub commits: Mutex<Vec<RemoteCommit>>,
    pub diffs: Mutex<HashMap<String, String>>,
    /// Branches passed to `list_directory`, in call order
    pub listed_branches: Mutex<Vec<String>>,
    pub diff_requests: AtomicUsize,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_branch(mut self, branch: &str, files: &[(&str, &str)]) -> Self {
        let tree = self.trees.entry(branch.to_string()).or_default();
        for (path, content) in files {
            tree.insert(path.to_string(), content.to_string());
        }
        self
    }

    pub fn with_commits(self, commits: Vec<RemoteCommit>) -> Self {
        *self.commits.lock().unwrap() = commits;
        self
    }

    fn tree(&self, branch: Option<&str>) -> Result<&BTreeMap<String, String>, VcsError> {
        let branch = branch.unwrap_or("main");
        self.trees
            .get(branch)
            .ok_or_else(|| VcsError::NotFound(format!("branch {}", branch)))
    }
}

pub fn commit(sha: &str, date: &str) -> RemoteCommit {
    RemoteCommit {
        sha: sha.to_string(),
        message: format!("Commit {}", sha),
        author_name: Some("Robin".to_string()),
        author_avatar: None,
        author_date: Some(date.to_string()),
    }
}

#[async_trait::async_trait]
impl RepositoryHost for ScriptedHost {
    async fn list_directory(
        &self,
        _repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Vec<RepoEntry>, VcsError> {
        if let Some(branch) = branch {
            self.listed_branches.lock().unwrap().push(branch.to_string());
        }
        let tree = self.tree(branch)?;

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let mut entries = BTreeMap::new();
        for (file_path, content) in tree {
            let Some(rest) = file_path.strip_prefix(&prefix) else {
                continue;
            };
            let (name, kind, size) = match rest.split_once('/') {
                Some((dir, _)) => (dir, EntryKind::Dir, 0),
                None => (rest, EntryKind::File, content.len() as u64),
            };
            entries.entry(name.to_string()).or_insert(RepoEntry {
                path: format!("{}{}", prefix, name),
                name: name.to_string(),
                kind,
                size,
            });
        }
        Ok(entries.into_values().collect())
    }

    async fn fetch_file(
        &self,
        _repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Vec<u8>, VcsError> {
        self.tree(branch)?
            .get(path)
            .map(|content| content.as_bytes().to_vec())
            .ok_or_else(|| VcsError::NotFound(path.to_string()))
    }

    async fn list_commits(
        &self,
        _repo: &RepoRef,
        per_page: usize,
    ) -> Result<Vec<RemoteCommit>, VcsError> {
        let commits = self.commits.lock().unwrap();
        Ok(commits.iter().take(per_page).cloned().collect())
    }

    async fn commit_diff(&self, _repo: &RepoRef, sha: &str) -> Result<String, VcsError> {
        self.diff_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .diffs
            .lock()
            .unwrap()
            .get(sha)
            .cloned()
            .unwrap_or_else(|| format!("+ change in {}", sha)))
    }

    async fn rate_limit(&self, _repo: &RepoRef) -> Result<RateLimitStatus, VcsError> {
        Ok(RateLimitStatus {
            limit: 5000,
            remaining: 4999,
            reset: 0,
        })
    }
}

/// Model whose summaries name the summarized file
pub struct ScriptedModel {
    /// Embeddings keyed by the exact embedded text
    pub vectors: Mutex<HashMap<String, Vec<f32>>>,
    /// Remaining rate-limit errors returned before `generate` succeeds
    pub rate_limited: AtomicUsize,
    pub generate_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
            rate_limited: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        }
    }

    pub fn summary_for(file_name: &str) -> String {
        format!("Summary of {}", file_name)
    }
}

pub fn basis(index: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIMENSION];
    v[index % DIMENSION] = 1.0;
    v
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .rate_limited
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LlmError::RateLimited {
                status: 429,
                message: "slow down".to_string(),
            });
        }

        Ok(prompt
            .split("purpose of the ")
            .nth(1)
            .and_then(|rest| rest.split(" file").next())
            .map(Self::summary_for)
            .unwrap_or_else(|| "Updated the widgets".to_string()))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(self
            .vectors
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| basis(DIMENSION - 1)))
    }

    async fn stream(&self, _prompt: &str) -> Result<TextStream, LlmError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let chunks: Vec<Result<String, LlmError>> =
            vec![Ok("Start in ".to_string()), Ok("src/main.rs.".to_string())];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn embedding_dimension(&self) -> usize {
        DIMENSION
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.llm.embedding_dimension = DIMENSION;
    config.rate_limit.spacing_ms = 0;
    config.rate_limit.base_delay_ms = 10;
    config
}

pub fn client(
    config: Config,
    host: Arc<ScriptedHost>,
    model: Arc<ScriptedModel>,
    store: Arc<dyn VectorStore>,
    commit_log: Arc<JsonCommitLog>,
) -> SageClient {
    SageClient::with_components(
        config,
        Components {
            host,
            model,
            store,
            commit_log,
            projects: Arc::new(InMemoryProjectDirectory::new()),
        },
    )
}
