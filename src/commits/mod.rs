//! Summarized commit history
//!
//! [`CommitPoller`] pulls the latest commits of a project's repository,
//! summarizes the diffs it has not seen yet and appends them to a
//! [`CommitLog`].

/// JSON file backed commit log
pub mod log;
/// Fetch, diff and summarize new commits
pub mod poller;

pub use log::JsonCommitLog;
pub use poller::CommitPoller;

use crate::error::CommitLogError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Author name stored when the host reports none
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// One summarized commit of a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommitRecord {
    pub id: String,
    pub project_id: String,
    /// Unique within a project
    pub commit_hash: String,
    pub commit_message: String,
    pub commit_author: String,
    pub commit_author_avatar: String,
    /// RFC 3339 author date, empty when unknown
    pub commit_date: String,
    /// Diff summary, empty when summarization failed
    pub summary: String,
}

impl CommitRecord {
    pub fn commit_id(project_id: &str, commit_hash: &str) -> String {
        format!("{}:{}", project_id, commit_hash)
    }

    /// Parsed `commit_date`, if it is a valid timestamp
    pub fn date(&self) -> Option<DateTime<Utc>> {
        parse_date(&self.commit_date)
    }
}

pub(crate) fn parse_date(date: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(date)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Storage for summarized commits
#[async_trait::async_trait]
pub trait CommitLog: Send + Sync {
    /// The `limit` most recent commits of a project, newest first
    async fn recent(
        &self,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<CommitRecord>, CommitLogError>;

    /// Append records, skipping any whose hash the project already has
    ///
    /// Returns the records actually inserted, in input order.
    async fn insert_many(
        &self,
        records: &[CommitRecord],
    ) -> Result<Vec<CommitRecord>, CommitLogError>;

    /// Every commit of a project, newest first
    async fn list(&self, project_id: &str) -> Result<Vec<CommitRecord>, CommitLogError>;
}
