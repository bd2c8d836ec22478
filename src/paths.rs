/// Platform-specific locations for the vector store, commit log and config file
///
/// Data lives under the OS data directory (XDG_DATA_HOME on Linux), configuration
/// under the OS config directory. Both fall back to the working directory.
use std::path::PathBuf;

/// Folder name used beneath the platform directories
pub const APP_FOLDER: &str = "repo-sage";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Root directory for persistent data
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_FOLDER)
    }

    /// Root directory for configuration
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_FOLDER)
    }

    /// Get default LanceDB database path
    ///
    /// Returns: {data_dir}/repo-sage/lancedb
    pub fn default_lancedb_path() -> PathBuf {
        Self::data_dir().join("lancedb")
    }

    /// Get default commit log path
    ///
    /// Returns: {data_dir}/repo-sage/commit_log.json
    pub fn default_commit_log_path() -> PathBuf {
        Self::data_dir().join("commit_log.json")
    }

    /// Get default config file path
    ///
    /// Returns: {config_dir}/repo-sage/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
