/// Configuration system for repo-sage
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, SageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Spacing and retry policy for model calls
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Remote repository host configuration
    #[serde(default)]
    pub vcs: VcsConfig,

    /// Repository loading and indexing configuration
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Similarity search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Commit polling configuration
    #[serde(default)]
    pub commits: CommitsConfig,

    /// Local storage locations
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Remote language model configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key (usually supplied through GEMINI_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the generative language REST API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model used for code and diff summaries
    #[serde(default = "default_generation_model")]
    pub generation_model: String,

    /// Model used for streamed answers
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used for summary and question embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Length of every embedding vector
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Spacing and retry policy for model calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum gap between two model calls, in milliseconds
    #[serde(default = "default_spacing_ms")]
    pub spacing_ms: u64,

    /// Attempts made when the provider reports a rate limit
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay in milliseconds; doubles on each attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Remote repository host configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct VcsConfig {
    /// REST API root
    #[serde(default = "default_vcs_api_url")]
    pub api_url: String,

    /// Fallback access token when a request does not carry one (GITHUB_TOKEN)
    #[serde(default)]
    pub token: Option<String>,

    /// Warn when less than this share of the API quota remains
    #[serde(default = "default_quota_warning_ratio")]
    pub quota_warning_ratio: f64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Repository loading and indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Branches tried in order until one yields documents
    #[serde(default = "default_candidate_branches")]
    pub candidate_branches: Vec<String>,

    /// Maximum parallel file reads while loading a branch
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Maximum parallel directory listings while counting files
    #[serde(default = "default_fetch_concurrency")]
    pub count_concurrency: usize,

    /// Documents summarized and embedded concurrently
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    /// Records written concurrently
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,

    /// Characters of source sent to the model for a file summary
    #[serde(default = "default_summary_source_chars")]
    pub summary_source_chars: usize,

    /// Glob patterns never loaded from the repository
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

/// Similarity search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Matches must have a cosine similarity strictly above this value
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Maximum number of matches used as context
    #[serde(default = "default_result_limit")]
    pub limit: usize,

    /// Upper bound on the context block handed to the model
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

/// Commit polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitsConfig {
    /// Number of recent commits fetched and compared per poll
    #[serde(default = "default_commit_window")]
    pub window: usize,
}

/// Local storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// LanceDB data directory path
    #[serde(default = "default_lancedb_path")]
    pub lancedb_path: PathBuf,

    /// Commit log file path
    #[serde(default = "default_commit_log_path")]
    pub commit_log_path: PathBuf,
}

// Default value functions
fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_generation_model() -> String {
    "gemini-1.5-flash-8b".to_string()
}

fn default_chat_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}

fn default_embedding_dimension() -> usize {
    768
}

fn default_request_timeout() -> u64 {
    120
}

fn default_spacing_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_vcs_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_quota_warning_ratio() -> f64 {
    0.10
}

fn default_candidate_branches() -> Vec<String> {
    ["master", "main", "develop", "development"]
        .iter()
        .map(|b| b.to_string())
        .collect()
}

fn default_fetch_concurrency() -> usize {
    10
}

fn default_embedding_batch_size() -> usize {
    5
}

fn default_write_batch_size() -> usize {
    10
}

fn default_summary_source_chars() -> usize {
    1000
}

fn default_ignore_patterns() -> Vec<String> {
    [
        ".gitignore",
        ".gitattributes",
        ".git/**",
        "package-lock.json",
        "yarn.lock",
        "pnpm-lock.yaml",
        "pnpm-workspace.yaml",
        "bun.lockb",
        "node_modules/**",
        ".DS_Store",
        "venv/**",
        ".env",
        "**/*.svg",
        "**/icons/**",
        "**/images/**",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_min_similarity() -> f32 {
    0.5
}

fn default_result_limit() -> usize {
    10
}

fn default_max_context_chars() -> usize {
    60_000
}

fn default_commit_window() -> usize {
    5
}

fn default_lancedb_path() -> PathBuf {
    crate::paths::PlatformPaths::default_lancedb_path()
}

fn default_commit_log_path() -> PathBuf {
    crate::paths::PlatformPaths::default_commit_log_path()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            generation_model: default_generation_model(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// Keeps the API key out of logs
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("generation_model", &self.generation_model)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimension", &self.embedding_dimension)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            spacing_ms: default_spacing_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            api_url: default_vcs_api_url(),
            token: None,
            quota_warning_ratio: default_quota_warning_ratio(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for VcsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcsConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("quota_warning_ratio", &self.quota_warning_ratio)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            candidate_branches: default_candidate_branches(),
            fetch_concurrency: default_fetch_concurrency(),
            count_concurrency: default_fetch_concurrency(),
            embedding_batch_size: default_embedding_batch_size(),
            write_batch_size: default_write_batch_size(),
            summary_source_chars: default_summary_source_chars(),
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
            limit: default_result_limit(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

impl Default for CommitsConfig {
    fn default() -> Self {
        Self {
            window: default_commit_window(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lancedb_path: default_lancedb_path(),
            commit_log_path: default_commit_log_path(),
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> SageError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, SageError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or fall back to defaults
    pub fn load_or_default() -> Result<Self, SageError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), SageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), SageError> {
        if self.llm.embedding_dimension == 0 {
            return Err(invalid("llm.embedding_dimension", "must be greater than 0"));
        }

        if self.rate_limit.max_retries == 0 {
            return Err(invalid("rate_limit.max_retries", "must be greater than 0"));
        }

        if self.indexing.candidate_branches.is_empty() {
            return Err(invalid(
                "indexing.candidate_branches",
                "must name at least one branch",
            ));
        }

        for (key, value) in [
            ("indexing.fetch_concurrency", self.indexing.fetch_concurrency),
            ("indexing.count_concurrency", self.indexing.count_concurrency),
            (
                "indexing.embedding_batch_size",
                self.indexing.embedding_batch_size,
            ),
            ("indexing.write_batch_size", self.indexing.write_batch_size),
            (
                "indexing.summary_source_chars",
                self.indexing.summary_source_chars,
            ),
            ("search.limit", self.search.limit),
            ("commits.window", self.commits.window),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be greater than 0"));
            }
        }

        if !(-1.0..=1.0).contains(&self.search.min_similarity) {
            return Err(invalid(
                "search.min_similarity",
                format!(
                    "must be between -1.0 and 1.0, got {}",
                    self.search.min_similarity
                ),
            ));
        }

        if !(0.0..=1.0).contains(&self.vcs.quota_warning_ratio) {
            return Err(invalid(
                "vcs.quota_warning_ratio",
                format!(
                    "must be between 0.0 and 1.0, got {}",
                    self.vcs.quota_warning_ratio
                ),
            ));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("GEMINI_API_KEY")
            && !key.trim().is_empty()
        {
            self.llm.api_key = Some(key);
        }

        if let Ok(token) = std::env::var("GITHUB_TOKEN")
            && !token.trim().is_empty()
        {
            self.vcs.token = Some(token);
        }

        if let Ok(url) = std::env::var("REPO_SAGE_LLM_BASE_URL") {
            self.llm.base_url = url;
        }

        if let Ok(url) = std::env::var("REPO_SAGE_GITHUB_API_URL") {
            self.vcs.api_url = url;
        }

        if let Ok(path) = std::env::var("REPO_SAGE_LANCEDB_PATH") {
            self.storage.lancedb_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("REPO_SAGE_COMMIT_LOG_PATH") {
            self.storage.commit_log_path = PathBuf::from(path);
        }

        if let Ok(spacing) = std::env::var("REPO_SAGE_RATE_LIMIT_MS")
            && let Ok(ms) = spacing.parse()
        {
            self.rate_limit.spacing_ms = ms;
        }

        if let Ok(min_similarity) = std::env::var("REPO_SAGE_MIN_SIMILARITY")
            && let Ok(score) = min_similarity.parse()
        {
            self.search.min_similarity = score;
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, SageError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
