/// Centralized error types for repo-sage using thiserror
///
/// Provides domain-specific error types for better error handling and user-facing messages.
use thiserror::Error;

/// Main error type for the knowledge-base pipeline
#[derive(Error, Debug)]
pub enum SageError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Repository host error: {0}")]
    Vcs(#[from] VcsError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("Commit log error: {0}")]
    CommitLog(#[from] CommitLogError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Credit check failed: {0}")]
    Credit(#[from] CreditError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors returned by the remote language model
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Rate limited by model provider (HTTP {status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("Model request failed (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Model request could not be sent: {0}")]
    Transport(String),

    #[error("Unexpected model response: {0}")]
    InvalidResponse(String),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Missing API key for model provider")]
    MissingApiKey,

    #[error("Operation failed after {attempts} attempts. Last error: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Errors related to the remote repository host
#[derive(Error, Debug, Clone)]
pub enum VcsError {
    #[error("Invalid repository URL: {0}")]
    InvalidUrl(String),

    #[error("Rate limited by repository host (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("Repository host request failed (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Repository host could not be reached: {0}")]
    Transport(String),

    #[error("Unexpected repository host response: {0}")]
    InvalidResponse(String),

    #[error("Path not found in repository: {0}")]
    NotFound(String),

    #[error(
        "Unable to load repository {url}. Possible issues:\n\
         1. Repository does not exist\n\
         2. No accessible branches\n\
         3. Invalid GitHub URL\n\
         4. Authentication failure\n\
         Please check your repository URL and access token."
    )]
    RepositoryUnreachable { url: String },
}

/// Errors related to vector store operations
#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Failed to connect to vector store: {0}")]
    ConnectionFailed(String),

    #[error("Vector store is not connected")]
    NotConnected,

    #[error("Failed to write record for '{file_name}': {reason}")]
    WriteFailed { file_name: String, reason: String },

    #[error("Failed to search vector store: {0}")]
    SearchFailed(String),

    #[error("Failed to delete records: {0}")]
    DeleteFailed(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors related to the commit log
#[derive(Error, Debug)]
pub enum CommitLogError {
    #[error("Failed to load commit log from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to save commit log to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid project id: {0}")]
    InvalidProjectId(String),

    #[error("{field} must be {constraint}, got {actual}")]
    ConstraintViolation {
        field: String,
        constraint: String,
        actual: String,
    },

    #[error("Unknown project: {0}")]
    UnknownProject(String),

    #[error("Empty {0}")]
    Empty(String),
}

/// Precondition failures raised before an indexing job starts
#[derive(Error, Debug)]
pub enum CreditError {
    #[error("Insufficient credits: indexing requires {required}, available {available}")]
    Insufficient { required: u64, available: u64 },
}

// Conversion from anyhow::Error to SageError
impl From<anyhow::Error> for SageError {
    fn from(err: anyhow::Error) -> Self {
        SageError::Other(format!("{:#}", err))
    }
}

impl SageError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        SageError::Other(msg.into())
    }

    /// Check if this is a user error (bad input, unreachable repo, no credits) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SageError::Validation(_)
                | SageError::Credit(_)
                | SageError::Vcs(VcsError::InvalidUrl(_))
                | SageError::Vcs(VcsError::RepositoryUnreachable { .. })
                | SageError::Config(ConfigError::InvalidValue { .. })
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SageError::Llm(LlmError::RateLimited { .. })
                | SageError::Vcs(VcsError::RateLimited { .. })
                | SageError::VectorStore(VectorStoreError::ConnectionFailed(_))
                | SageError::Io(_)
        )
    }
}
