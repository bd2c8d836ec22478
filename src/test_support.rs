//! Scripted collaborators shared by unit tests

use crate::error::{LlmError, VcsError};
use crate::llm::{LanguageModel, TextStream};
use crate::vcs::{EntryKind, RateLimitStatus, RemoteCommit, RepoEntry, RepoRef, RepositoryHost};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HostCall {
    List { branch: Option<String>, path: String },
    Fetch { branch: Option<String>, path: String },
    Commits,
    Diff(String),
    RateLimit,
}

/// In-memory repository host with one file tree per branch
pub(crate) struct FakeHost {
    trees: HashMap<String, BTreeMap<String, Vec<u8>>>,
    default_branch: String,
    pub commits: Mutex<Vec<RemoteCommit>>,
    pub diffs: Mutex<HashMap<String, String>>,
    pub quota: Option<RateLimitStatus>,
    /// Remaining calls answered with a 429 before the host recovers
    pub rate_limited: AtomicUsize,
    calls: Mutex<Vec<HostCall>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            trees: HashMap::new(),
            default_branch: "main".to_string(),
            commits: Mutex::new(Vec::new()),
            diffs: Mutex::new(HashMap::new()),
            quota: None,
            rate_limited: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_branch(mut self, branch: &str, files: &[(&str, &str)]) -> Self {
        let tree = self.trees.entry(branch.to_string()).or_default();
        for (path, content) in files {
            tree.insert(path.to_string(), content.as_bytes().to_vec());
        }
        self
    }

    pub fn with_bytes(mut self, branch: &str, path: &str, bytes: &[u8]) -> Self {
        self.trees
            .entry(branch.to_string())
            .or_default()
            .insert(path.to_string(), bytes.to_vec());
        self
    }

    pub fn with_commits(self, commits: Vec<RemoteCommit>) -> Self {
        *self.commits.lock().unwrap() = commits;
        self
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn throttle(&self) -> Result<(), VcsError> {
        if self
            .rate_limited
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(VcsError::RateLimited { status: 429 });
        }
        Ok(())
    }

    fn tree(&self, branch: Option<&str>) -> Result<&BTreeMap<String, Vec<u8>>, VcsError> {
        let branch = branch.unwrap_or(&self.default_branch);
        self.trees
            .get(branch)
            .ok_or_else(|| VcsError::NotFound(format!("branch {}", branch)))
    }
}

pub(crate) fn commit(sha: &str, date: &str) -> RemoteCommit {
    RemoteCommit {
        sha: sha.to_string(),
        message: format!("Commit {}", sha),
        author_name: Some("Dana".to_string()),
        author_avatar: Some(format!("https://avatars.example/{}", sha)),
        author_date: Some(date.to_string()),
    }
}

#[async_trait::async_trait]
impl RepositoryHost for FakeHost {
    async fn list_directory(
        &self,
        _repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Vec<RepoEntry>, VcsError> {
        self.record(HostCall::List {
            branch: branch.map(str::to_string),
            path: path.to_string(),
        });
        self.throttle()?;
        let tree = self.tree(branch)?;

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let mut entries = BTreeMap::new();
        for (file_path, bytes) in tree {
            let Some(rest) = file_path.strip_prefix(&prefix) else {
                continue;
            };
            let (name, kind, size) = match rest.split_once('/') {
                Some((dir, _)) => (dir, EntryKind::Dir, 0),
                None => (rest, EntryKind::File, bytes.len() as u64),
            };
            entries.entry(name.to_string()).or_insert(RepoEntry {
                path: format!("{}{}", prefix, name),
                name: name.to_string(),
                kind,
                size,
            });
        }

        if entries.is_empty() && !path.is_empty() {
            return Err(VcsError::NotFound(path.to_string()));
        }
        Ok(entries.into_values().collect())
    }

    async fn fetch_file(
        &self,
        _repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Vec<u8>, VcsError> {
        self.record(HostCall::Fetch {
            branch: branch.map(str::to_string),
            path: path.to_string(),
        });
        self.throttle()?;
        self.tree(branch)?
            .get(path)
            .cloned()
            .ok_or_else(|| VcsError::NotFound(path.to_string()))
    }

    async fn list_commits(
        &self,
        _repo: &RepoRef,
        per_page: usize,
    ) -> Result<Vec<RemoteCommit>, VcsError> {
        self.record(HostCall::Commits);
        self.throttle()?;
        let commits = self.commits.lock().unwrap();
        Ok(commits.iter().take(per_page).cloned().collect())
    }

    async fn commit_diff(&self, _repo: &RepoRef, sha: &str) -> Result<String, VcsError> {
        self.record(HostCall::Diff(sha.to_string()));
        self.throttle()?;
        self.diffs
            .lock()
            .unwrap()
            .get(sha)
            .cloned()
            .ok_or_else(|| VcsError::NotFound(sha.to_string()))
    }

    async fn rate_limit(&self, _repo: &RepoRef) -> Result<RateLimitStatus, VcsError> {
        self.record(HostCall::RateLimit);
        self.quota
            .ok_or_else(|| VcsError::Transport("quota endpoint unavailable".to_string()))
    }
}

/// Language model with deterministic output and scripted failures
pub(crate) struct FakeModel {
    dimension: usize,
    /// Texts whose embedding fails
    pub failing_embeds: Mutex<Vec<String>>,
    /// Prompts containing any of these fragments fail to generate
    pub failing_prompts: Mutex<Vec<String>>,
    /// Exact embedding returned for a given text
    pub vectors: Mutex<HashMap<String, Vec<f32>>>,
    pub answer_chunks: Vec<String>,
    pub generated: Mutex<Vec<String>>,
    pub embedded: Mutex<Vec<String>>,
    pub streamed: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            failing_embeds: Mutex::new(Vec::new()),
            failing_prompts: Mutex::new(Vec::new()),
            vectors: Mutex::new(HashMap::new()),
            answer_chunks: vec!["The answer".to_string(), " is here.".to_string()],
            generated: Mutex::new(Vec::new()),
            embedded: Mutex::new(Vec::new()),
            streamed: Mutex::new(Vec::new()),
        }
    }

    /// Summary produced for a code prompt naming `file_name`
    pub fn summary_for(file_name: &str) -> String {
        format!("Summary of {}", file_name)
    }

    fn default_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dimension] += byte as f32;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt().max(1.0);
        vector.iter().map(|v| v / norm).collect()
    }
}

#[async_trait::async_trait]
impl LanguageModel for FakeModel {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.generated.lock().unwrap().push(prompt.to_string());
        if self
            .failing_prompts
            .lock()
            .unwrap()
            .iter()
            .any(|f| prompt.contains(f.as_str()))
        {
            return Err(LlmError::Http {
                status: 500,
                message: "generation failed".to_string(),
            });
        }

        // Code prompts name the file being summarized
        let summary = prompt
            .split("purpose of the ")
            .nth(1)
            .and_then(|rest| rest.split(" file").next())
            .map(Self::summary_for)
            .unwrap_or_else(|| "Refactored the diff".to_string());
        Ok(summary)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embedded.lock().unwrap().push(text.to_string());
        if self
            .failing_embeds
            .lock()
            .unwrap()
            .iter()
            .any(|t| t == text)
        {
            return Err(LlmError::Http {
                status: 400,
                message: "embedding failed".to_string(),
            });
        }
        if let Some(vector) = self.vectors.lock().unwrap().get(text) {
            return Ok(vector.clone());
        }
        Ok(self.default_vector(text))
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream, LlmError> {
        self.streamed.lock().unwrap().push(prompt.to_string());
        let chunks: Vec<Result<String, LlmError>> =
            self.answer_chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}
