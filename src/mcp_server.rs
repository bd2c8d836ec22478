use crate::client::SageClient;
use crate::types::*;

use anyhow::{Context, Result};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
    handler::server::{router::prompt::PromptRouter, tool::ToolRouter, wrapper::Parameters},
    model::*,
    prompt, prompt_handler, prompt_router,
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct SageMcpServer {
    client: Arc<SageClient>,
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
}

impl SageMcpServer {
    /// Create a new MCP server with default configuration
    pub async fn new() -> Result<Self> {
        let client = SageClient::new().await?;
        Ok(Self::with_client(Arc::new(client)))
    }

    /// Create a new MCP server with an existing client
    pub fn with_client(client: Arc<SageClient>) -> Self {
        Self {
            client,
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        }
    }

    /// Get the underlying client
    pub fn client(&self) -> &SageClient {
        &self.client
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Serialization failed: {}", e))
}

#[tool_router(router = tool_router)]
impl SageMcpServer {
    #[tool(
        description = "Index a GitHub repository into a project: every file is summarized, the summary embedded, and both stored for question answering. Waits for a run already in progress for the same project."
    )]
    async fn index_repository(
        &self,
        Parameters(req): Parameters<IndexRequest>,
    ) -> Result<String, String> {
        req.validate().map_err(|e| e.to_string())?;
        let start = Instant::now();

        let records = self
            .client
            .create_index(&req.repo_url, req.access_token, &req.project_id)
            .await
            .map_err(|e| format!("{:#}", e))?; // Use alternate display to show full error chain

        to_json(&IndexResponse {
            project_id: req.project_id,
            files_indexed: records.len(),
            files: records.into_iter().map(|r| r.file_name).collect(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    #[tool(
        description = "Answer a question about an indexed project using its most relevant files as context. Returns the answer and the referenced files."
    )]
    async fn ask_question(&self, Parameters(req): Parameters<AskRequest>) -> Result<String, String> {
        req.validate().map_err(|e| e.to_string())?;

        let answer = self
            .client
            .ask(&req.question, &req.project_id)
            .await
            .map_err(|e| format!("{:#}", e))?;
        let text = answer
            .stream
            .collect_text()
            .await
            .map_err(|e| format!("Answer stream failed: {}", e))?;

        to_json(&AskResponse {
            answer: text,
            file_references: answer.file_references,
        })
    }

    #[tool(
        description = "Summarize the project's latest commits that are not in its commit log yet and store them"
    )]
    async fn poll_commits(
        &self,
        Parameters(req): Parameters<PollCommitsRequest>,
    ) -> Result<String, String> {
        req.validate().map_err(|e| e.to_string())?;

        if let Some(url) = &req.repo_url {
            self.client
                .register_project(&req.project_id, url, req.access_token.clone())
                .await
                .map_err(|e| format!("{:#}", e))?;
        }

        let new_commits = self
            .client
            .poll_commits(&req.project_id)
            .await
            .map_err(|e| format!("{:#}", e))?;

        to_json(&PollCommitsResponse { new_commits })
    }

    #[tool(description = "List a project's summarized commits, newest first")]
    async fn list_commits(
        &self,
        Parameters(req): Parameters<CommitLogRequest>,
    ) -> Result<String, String> {
        req.validate().map_err(|e| e.to_string())?;

        let commits = self
            .client
            .list_commits(&req.project_id, req.limit)
            .await
            .map_err(|e| format!("{:#}", e))?;

        to_json(&CommitLogResponse { commits })
    }

    #[tool(
        description = "Count the files of a repository (one credit each) and optionally check them against available credits"
    )]
    async fn estimate_files(
        &self,
        Parameters(req): Parameters<EstimateRequest>,
    ) -> Result<String, String> {
        req.validate().map_err(|e| e.to_string())?;

        let file_count = self
            .client
            .estimate_file_count(&req.repo_url, req.access_token)
            .await
            .map_err(|e| format!("{:#}", e))?;

        to_json(&EstimateResponse {
            file_count,
            sufficient: req
                .available_credits
                .map(|credits| file_count as u64 <= credits),
        })
    }

    #[tool(description = "Delete every indexed file of a project")]
    async fn archive_project(
        &self,
        Parameters(req): Parameters<ArchiveRequest>,
    ) -> Result<String, String> {
        req.validate().map_err(|e| e.to_string())?;

        let records_deleted = self
            .client
            .archive_project(&req.project_id)
            .await
            .map_err(|e| format!("{:#}", e))?;

        to_json(&ArchiveResponse { records_deleted })
    }
}

// Prompts for slash commands
#[prompt_router]
impl SageMcpServer {
    #[prompt(
        name = "index",
        description = "Index a GitHub repository so questions can be asked about it"
    )]
    async fn index_prompt(
        &self,
        Parameters(args): Parameters<serde_json::Value>,
    ) -> Result<GetPromptResult, McpError> {
        let repo_url = args.get("repo_url").and_then(|v| v.as_str()).unwrap_or("");
        let project_id = args
            .get("project_id")
            .and_then(|v| v.as_str())
            .unwrap_or("default");

        let messages = vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "Please index the repository '{}' into project '{}'.",
                repo_url, project_id
            ),
        )];

        Ok(GetPromptResult {
            description: Some(format!("Index {} as {}", repo_url, project_id)),
            messages,
        })
    }

    #[prompt(name = "ask", description = "Ask a question about an indexed project")]
    async fn ask_prompt(
        &self,
        Parameters(args): Parameters<serde_json::Value>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        let question = args.get("question").and_then(|v| v.as_str()).unwrap_or("");
        let project_id = args
            .get("project_id")
            .and_then(|v| v.as_str())
            .unwrap_or("default");

        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "Using project '{}', please answer: {}",
                project_id, question
            ),
        )])
    }

    #[prompt(
        name = "commits",
        description = "Summarize the latest commits of an indexed project"
    )]
    async fn commits_prompt(
        &self,
        Parameters(args): Parameters<serde_json::Value>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        let project_id = args
            .get("project_id")
            .and_then(|v| v.as_str())
            .unwrap_or("default");

        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "Please poll and then list the summarized commits of project '{}'.",
                project_id
            ),
        )])
    }
}

#[tool_handler(router = self.tool_router)]
#[prompt_handler]
impl ServerHandler for SageMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .build(),
            server_info: Implementation {
                name: "repo-sage".into(),
                title: Some("Repo Sage - Questions and Commit Summaries for GitHub Repositories".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Retrieval-augmented answers about GitHub repositories. \
                Use estimate_files to check the credit cost, index_repository to build a project's knowledge base, \
                ask_question to query it, and poll_commits / list_commits for summarized commit history."
                    .into(),
            ),
        }
    }
}

impl SageMcpServer {
    pub async fn serve_stdio() -> Result<()> {
        tracing::info!("Starting repo-sage MCP server");

        let server = Self::new().await.context("Failed to create MCP server")?;
        server.run_stdio().await
    }

    /// Serve this server over stdio until the client disconnects
    pub async fn run_stdio(self) -> Result<()> {
        let transport = rmcp::transport::io::stdio();

        self.serve(transport).await?.waiting().await?;

        Ok(())
    }
}
