//! Remote repository enumeration: file counting and document loading

/// Recursive file counting for credit estimates
pub mod counter;
/// Glob ignore list applied while loading
pub mod ignore;
/// Branch-probing document loader
pub mod loader;

pub use counter::RepositoryFileCounter;
pub use ignore::IgnoreFilter;
pub use loader::RepositoryLoader;

use serde::{Deserialize, Serialize};

/// One text file pulled from a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Path from the repository root, unique within one load
    pub path: String,
    pub content: String,
    pub size_bytes: u64,
}

impl Document {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size_bytes: content.len() as u64,
            content,
        }
    }
}

/// Decode file bytes as text, rejecting binary content
pub(crate) fn decode_text(bytes: Vec<u8>) -> Option<String> {
    // Same heuristic git uses: a NUL byte near the start means binary
    let probe = &bytes[..bytes.len().min(8000)];
    if probe.contains(&0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}
