use crate::commits::CommitRecord;
use crate::error::ValidationError;
use crate::qa::FileReference;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const MAX_PROJECT_ID_LEN: usize = 128;

/// Check that a project id is non-empty and only uses `[A-Za-z0-9_.-]`
pub fn validate_project_id(project_id: &str) -> Result<(), ValidationError> {
    if project_id.is_empty() || project_id.len() > MAX_PROJECT_ID_LEN {
        return Err(ValidationError::InvalidProjectId(format!(
            "'{}' must be 1 to {} characters",
            project_id, MAX_PROJECT_ID_LEN
        )));
    }
    if let Some(c) = project_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(ValidationError::InvalidProjectId(format!(
            "'{}' contains '{}'",
            project_id, c
        )));
    }
    Ok(())
}

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field.to_string()));
    }
    Ok(())
}

/// Request to index a repository into a project
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexRequest {
    /// Repository URL, e.g. https://github.com/owner/repo
    pub repo_url: String,
    /// Project the records belong to
    pub project_id: String,
    /// Optional access token for private repositories
    #[serde(default)]
    pub access_token: Option<String>,
}

impl IndexRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("repo_url", &self.repo_url)?;
        validate_project_id(&self.project_id)
    }
}

/// Response from indexing operation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexResponse {
    pub project_id: String,
    /// Number of files summarized, embedded and stored
    pub files_indexed: usize,
    /// Paths of the stored files
    pub files: Vec<String>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Question about an indexed project
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AskRequest {
    pub question: String,
    pub project_id: String,
}

impl AskRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("question", &self.question)?;
        validate_project_id(&self.project_id)
    }
}

/// A complete answer and the files it was drawn from
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AskResponse {
    /// Markdown answer text
    pub answer: String,
    pub file_references: Vec<FileReference>,
}

/// Request to summarize a project's new commits
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PollCommitsRequest {
    pub project_id: String,
    /// Repository of the project, required if it has not been indexed in this session
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl PollCommitsRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_project_id(&self.project_id)?;
        if let Some(url) = &self.repo_url {
            require("repo_url", url)?;
        }
        Ok(())
    }
}

/// Commits summarized by a poll
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PollCommitsResponse {
    pub new_commits: Vec<CommitRecord>,
}

/// Request to read a project's commit log
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommitLogRequest {
    pub project_id: String,
    /// Maximum number of commits to return, newest first (default: 20)
    #[serde(default = "default_commit_limit")]
    pub limit: usize,
}

fn default_commit_limit() -> usize {
    20
}

impl CommitLogRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_project_id(&self.project_id)?;
        if self.limit == 0 {
            return Err(ValidationError::ConstraintViolation {
                field: "limit".to_string(),
                constraint: "greater than 0".to_string(),
                actual: self.limit.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommitLogResponse {
    pub commits: Vec<CommitRecord>,
}

/// Request to count the files of a repository before indexing it
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EstimateRequest {
    pub repo_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Credits the caller has; when set the response says whether they suffice
    #[serde(default)]
    pub available_credits: Option<u64>,
}

impl EstimateRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("repo_url", &self.repo_url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EstimateResponse {
    /// Files in the repository, one credit each
    pub file_count: usize,
    /// Whether `available_credits` covers the file count
    pub sufficient: Option<bool>,
}

/// Request to archive a project
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArchiveRequest {
    pub project_id: String,
}

impl ArchiveRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_project_id(&self.project_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArchiveResponse {
    /// Number of indexed files removed
    pub records_deleted: usize,
}
