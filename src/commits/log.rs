use super::{CommitLog, CommitRecord};
use crate::error::CommitLogError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CommitLogFile {
    /// Project id -> commits in insertion order
    projects: HashMap<String, Vec<CommitRecord>>,
}

/// [`CommitLog`] kept in memory and mirrored to a JSON file after every insert
#[derive(Debug)]
pub struct JsonCommitLog {
    path: Option<PathBuf>,
    data: Mutex<CommitLogFile>,
}

impl JsonCommitLog {
    /// Get the default log file path
    pub fn default_path() -> PathBuf {
        crate::paths::PlatformPaths::default_commit_log_path()
    }

    /// Open the log at `path`, starting empty when the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CommitLogError> {
        let path = path.into();
        let data = Self::load(&path)?;
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// A log that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(CommitLogFile::default()),
        }
    }

    fn load(path: &Path) -> Result<CommitLogFile, CommitLogError> {
        if !path.exists() {
            tracing::debug!("Commit log not found at {:?}, starting empty", path);
            return Ok(CommitLogFile::default());
        }

        let load_failed = |reason: String| CommitLogError::LoadFailed {
            path: path.display().to_string(),
            reason,
        };
        let content = fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
        let data: CommitLogFile =
            serde_json::from_str(&content).map_err(|e| load_failed(e.to_string()))?;

        tracing::info!(
            "Loaded commit log with {} projects from {:?}",
            data.projects.len(),
            path
        );
        Ok(data)
    }

    fn save(&self, data: &CommitLogFile) -> Result<(), CommitLogError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let save_failed = |reason: String| CommitLogError::SaveFailed {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        let content =
            serde_json::to_string_pretty(data).map_err(|e| save_failed(e.to_string()))?;

        // Write then rename so a crash never leaves a half-written log
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| save_failed(e.to_string()))?;
        fs::rename(&tmp, path).map_err(|e| save_failed(e.to_string()))?;

        tracing::debug!("Saved commit log to {:?}", path);
        Ok(())
    }
}

/// Commits ordered newest first by date; undated commits sort last, and
/// ties go to the one inserted later
fn newest_first(records: &[CommitRecord]) -> Vec<CommitRecord> {
    let mut indexed: Vec<(usize, &CommitRecord)> = records.iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| b.date().cmp(&a.date()).then(ib.cmp(ia)));
    indexed.into_iter().map(|(_, r)| r.clone()).collect()
}

#[async_trait::async_trait]
impl CommitLog for JsonCommitLog {
    async fn recent(
        &self,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<CommitRecord>, CommitLogError> {
        let mut records = self.list(project_id).await?;
        records.truncate(limit);
        Ok(records)
    }

    async fn insert_many(
        &self,
        records: &[CommitRecord],
    ) -> Result<Vec<CommitRecord>, CommitLogError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut data = self.data.lock().await;
        let mut inserted = Vec::new();
        let mut lengths: HashMap<String, usize> = HashMap::new();
        for record in records {
            let commits = data.projects.entry(record.project_id.clone()).or_default();
            lengths
                .entry(record.project_id.clone())
                .or_insert(commits.len());
            if commits
                .iter()
                .any(|c| c.commit_hash == record.commit_hash)
            {
                tracing::debug!(
                    "Commit {} already logged for project {}",
                    record.commit_hash,
                    record.project_id
                );
                continue;
            }
            commits.push(record.clone());
            inserted.push(record.clone());
        }

        if !inserted.is_empty()
            && let Err(e) = self.save(&data)
        {
            // Keep memory in step with the file
            for (project_id, len) in lengths {
                if let Some(commits) = data.projects.get_mut(&project_id) {
                    commits.truncate(len);
                }
            }
            data.projects.retain(|_, commits| !commits.is_empty());
            return Err(e);
        }
        Ok(inserted)
    }

    async fn list(&self, project_id: &str) -> Result<Vec<CommitRecord>, CommitLogError> {
        let data = self.data.lock().await;
        Ok(data
            .projects
            .get(project_id)
            .map(|commits| newest_first(commits))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(project: &str, hash: &str, date: &str) -> CommitRecord {
        CommitRecord {
            id: CommitRecord::commit_id(project, hash),
            project_id: project.to_string(),
            commit_hash: hash.to_string(),
            commit_message: format!("Commit {}", hash),
            commit_author: "Dana".to_string(),
            commit_author_avatar: String::new(),
            commit_date: date.to_string(),
            summary: format!("Summary of {}", hash),
        }
    }

    #[tokio::test]
    async fn test_insert_skips_known_hashes() {
        let log = JsonCommitLog::in_memory();
        let first = vec![
            record("p", "a", "2024-01-01T00:00:00Z"),
            record("p", "b", "2024-01-02T00:00:00Z"),
        ];
        assert_eq!(log.insert_many(&first).await.unwrap().len(), 2);

        let second = vec![
            record("p", "b", "2024-01-02T00:00:00Z"),
            record("p", "c", "2024-01-03T00:00:00Z"),
            record("p", "c", "2024-01-03T00:00:00Z"),
        ];
        let inserted = log.insert_many(&second).await.unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].commit_hash, "c");
        assert_eq!(log.list("p").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_same_hash_in_other_project() {
        let log = JsonCommitLog::in_memory();
        log.insert_many(&[record("p1", "a", "2024-01-01T00:00:00Z")])
            .await
            .unwrap();
        assert_eq!(
            log.insert_many(&[record("p2", "a", "2024-01-01T00:00:00Z")])
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let log = JsonCommitLog::in_memory();
        log.insert_many(&[
            record("p", "old", "2024-01-01T00:00:00Z"),
            record("p", "undated", ""),
            record("p", "new", "2024-03-01T00:00:00Z"),
            record("p", "mid", "2024-02-01T10:00:00+02:00"),
        ])
        .await
        .unwrap();

        let hashes: Vec<String> = log
            .recent("p", 3)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.commit_hash)
            .collect();
        assert_eq!(hashes, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_unknown_project_is_empty() {
        let log = JsonCommitLog::in_memory();
        assert!(log.recent("nope", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("commits.json");

        let log = JsonCommitLog::open(&path).unwrap();
        log.insert_many(&[record("p", "a", "2024-01-01T00:00:00Z")])
            .await
            .unwrap();
        assert!(path.exists());

        let reopened = JsonCommitLog::open(&path).unwrap();
        let records = reopened.list("p").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].summary, "Summary of a");
    }

    #[test]
    fn test_open_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commits.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            JsonCommitLog::open(&path),
            Err(CommitLogError::LoadFailed { .. })
        ));
    }
}
