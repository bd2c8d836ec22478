//! Glob-based ignore list for repository paths

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled ignore patterns
///
/// A pattern matches a path when it matches the whole path or any suffix
/// made of trailing path components, so `.env` also ignores `config/.env`
/// and `node_modules/**` ignores `web/node_modules/react/index.js`.
/// Patterns ending in `/**` additionally prune the directory itself, which
/// keeps the walker from listing it at all.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    files: GlobSet,
    dirs: GlobSet,
}

impl IgnoreFilter {
    /// Compile a pattern list; invalid patterns are logged and skipped
    pub fn new(patterns: &[String]) -> Self {
        let mut files = GlobSetBuilder::new();
        let mut dirs = GlobSetBuilder::new();

        for pattern in patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    files.add(glob);
                }
                Err(e) => {
                    tracing::warn!("Skipping invalid ignore pattern '{}': {}", pattern, e);
                    continue;
                }
            }

            if let Some(dir) = pattern.strip_suffix("/**")
                && let Ok(glob) = Glob::new(dir)
            {
                dirs.add(glob);
            }
        }

        Self {
            files: build(files),
            dirs: build(dirs),
        }
    }

    /// Filter that ignores nothing
    pub fn none() -> Self {
        Self::new(&[])
    }

    /// Whether a file path is excluded
    pub fn is_ignored(&self, path: &str) -> bool {
        matches_suffix(&self.files, path)
    }

    /// Whether a directory and everything under it is excluded
    pub fn is_ignored_dir(&self, path: &str) -> bool {
        matches_suffix(&self.dirs, path)
    }
}

fn build(builder: GlobSetBuilder) -> GlobSet {
    builder.build().unwrap_or_else(|e| {
        tracing::warn!("Failed to build ignore set, ignoring nothing: {}", e);
        GlobSet::empty()
    })
}

fn matches_suffix(set: &GlobSet, path: &str) -> bool {
    if set.is_empty() {
        return false;
    }

    let path = path.trim_start_matches('/');
    if set.is_match(path) {
        return true;
    }

    let mut rest = path;
    while let Some(idx) = rest.find('/') {
        rest = &rest[idx + 1..];
        if !rest.is_empty() && set.is_match(rest) {
            return true;
        }
    }
    false
}
