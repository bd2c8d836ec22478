//! Project id to repository lookup
//!
//! Projects themselves are owned by the caller (the web app creating them,
//! or the CLI/MCP session). The pipeline only needs to know which repository
//! a project points at and which token reads it.

use crate::error::ValidationError;
use std::collections::HashMap;
use std::sync::RwLock;

/// Where a project's sources live
#[derive(Clone, PartialEq, Eq)]
pub struct ProjectSource {
    pub repo_url: String,
    pub access_token: Option<String>,
}

impl std::fmt::Debug for ProjectSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectSource")
            .field("repo_url", &self.repo_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Resolves a project id to its repository
#[async_trait::async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn resolve(&self, project_id: &str) -> Result<ProjectSource, ValidationError>;

    /// Called when a project is indexed from `source`
    ///
    /// Directories backed by an external source of truth can ignore it.
    async fn remember(&self, _project_id: &str, _source: ProjectSource) {}
}

/// [`ProjectDirectory`] filled in by whoever creates projects in this process
#[derive(Debug, Default)]
pub struct InMemoryProjectDirectory {
    projects: RwLock<HashMap<String, ProjectSource>>,
}

impl InMemoryProjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a project
    pub fn register(
        &self,
        project_id: impl Into<String>,
        repo_url: impl Into<String>,
        access_token: Option<String>,
    ) {
        let source = ProjectSource {
            repo_url: repo_url.into(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
        };
        if let Ok(mut projects) = self.projects.write() {
            projects.insert(project_id.into(), source);
        }
    }

    /// Forget a project, returning whether it was known
    pub fn remove(&self, project_id: &str) -> bool {
        self.projects
            .write()
            .map(|mut projects| projects.remove(project_id).is_some())
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl ProjectDirectory for InMemoryProjectDirectory {
    async fn resolve(&self, project_id: &str) -> Result<ProjectSource, ValidationError> {
        self.projects
            .read()
            .ok()
            .and_then(|projects| projects.get(project_id).cloned())
            .ok_or_else(|| ValidationError::UnknownProject(project_id.to_string()))
    }

    async fn remember(&self, project_id: &str, source: ProjectSource) {
        self.register(project_id, source.repo_url, source.access_token);
    }
}
