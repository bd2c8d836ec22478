//! # Repo Sage - Questions and Commit Summaries for GitHub Repositories
//!
//! A Rust library, CLI and Model Context Protocol (MCP) server that turns a
//! remote GitHub repository into a queryable knowledge base.
//!
//! ## Overview
//!
//! Every file of a repository is summarized by a language model, the
//! summary is embedded, and both are stored per project in a vector store.
//! Questions are answered by retrieving the most similar summaries and
//! streaming a model answer grounded on them. A second pipeline summarizes
//! the latest commits of a project into a commit log, skipping commits it
//! has already seen.
//!
//! ## Architecture
//!
//! ```text
//!   MCP client / CLI
//!          |
//!    SageMcpServer  (6 tools, 3 prompts)
//!          |
//!      SageClient
//!          |
//!  +-------+--------+-------------+--------------+
//!  |       |        |             |              |
//! Loader  Indexer  QuestionAnswerer  CommitPoller  FileCounter
//!  |       |        |             |
//!  |    LlmGateway (rate-limited, retried)
//!  |       |        |             |
//! GitHub  Gemini   LanceDB      JSON commit log
//! ```
//!
//! ## Modules
//!
//! - [`client`]: [`SageClient`], the facade every entry point goes through
//! - [`mcp_server`]: MCP protocol server with tools and prompts
//! - [`vcs`]: repository host abstraction and the GitHub REST client
//! - [`repository`]: recursive loading, ignore rules and file counting
//! - [`llm`]: language model abstraction, Gemini client and prompts
//! - [`rate_limit`]: serialized request spacing and retry with backoff
//! - [`indexer`]: summarize, embed and store documents
//! - [`store`]: vector store abstraction (LanceDB and in-memory)
//! - [`qa`]: retrieval and grounded answer streaming
//! - [`commits`]: commit polling and the persistent commit log
//! - [`projects`]: project id to repository resolution
//! - [`config`]: configuration management with environment overrides
//! - [`types`]: request/response types with JSON schema
//! - [`error`]: error types
//! - [`paths`]: data directory helpers
//!
//! ## Usage Example
//!
//! ```no_run
//! use repo_sage::mcp_server::SageMcpServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Serve over stdio (MCP protocol) with the default configuration
//!     SageMcpServer::serve_stdio().await?;
//!     Ok(())
//! }
//! ```

/// Client facade wiring the pipelines together
pub mod client;

/// Commit polling and the persistent commit log
pub mod commits;

/// Configuration management with environment variable overrides
pub mod config;

/// Error types and utilities
pub mod error;

/// Summarize, embed and store repository documents
pub mod indexer;

/// Language model access: Gemini client, prompts and the rate-limited gateway
pub mod llm;

/// MCP server implementation with tools and prompts
pub mod mcp_server;

/// Data directory helpers
pub mod paths;

/// Project id to repository resolution
pub mod projects;

/// Retrieval and grounded answers
pub mod qa;

/// Request spacing and retry with exponential backoff
pub mod rate_limit;

/// Recursive repository loading and file counting
pub mod repository;

/// Vector store abstraction supporting LanceDB and an in-memory backend
pub mod store;

/// MCP request/response types with JSON schema definitions
pub mod types;

/// Repository hosts (GitHub)
pub mod vcs;

#[cfg(test)]
mod test_support;

pub use client::{Components, SageClient};
pub use config::Config;
pub use error::SageError;
