//! Vector store for code summaries and their embeddings

/// Embedded LanceDB backend
pub mod lance;
/// Brute-force in-process backend
pub mod memory;

pub use lance::LanceVectorStore;
pub use memory::InMemoryVectorStore;

use crate::error::VectorStoreError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One indexed file: its source, the model's summary, and the summary's embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeEmbeddingRecord {
    /// Derived from `(project_id, file_name)`, so re-indexing a file replaces it
    pub id: String,
    pub project_id: String,
    pub file_name: String,
    pub source_code: String,
    pub summary: String,
    /// Embedding of `summary`, not of `source_code`
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl CodeEmbeddingRecord {
    pub fn new(
        project_id: impl Into<String>,
        file_name: impl Into<String>,
        source_code: impl Into<String>,
        summary: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        let project_id = project_id.into();
        let file_name = file_name.into();
        Self {
            id: record_id(&project_id, &file_name),
            project_id,
            file_name,
            source_code: source_code.into(),
            summary: summary.into(),
            embedding,
            created_at: Utc::now(),
        }
    }
}

/// Stable record id for a file of a project
pub fn record_id(project_id: &str, file_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(file_name.as_bytes());
    format!("{:x}", hasher.finalize())[..32].to_string()
}

/// A stored record that is similar to a query vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SimilarityMatch {
    pub file_name: String,
    pub summary: String,
    pub source_code: String,
    /// Cosine similarity to the query, in [-1, 1]
    pub similarity: f32,
}

/// Trait for vector store operations
///
/// All records are scoped by project id; no operation reads or changes
/// another project's records.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Open the underlying connection for a run of operations
    ///
    /// Calls nest: the connection is closed when every `acquire` has been
    /// matched by a [`release`](Self::release).
    async fn acquire(&self) -> Result<(), VectorStoreError>;

    /// Give back a connection obtained with [`acquire`](Self::acquire)
    async fn release(&self);

    /// Insert a record together with its vector, replacing any record with
    /// the same project and file name
    async fn upsert(&self, record: &CodeEmbeddingRecord) -> Result<(), VectorStoreError>;

    /// Records of `project_id` whose similarity to `query` is strictly
    /// greater than `min_similarity`, most similar first, at most `limit`
    async fn search(
        &self,
        project_id: &str,
        query: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>, VectorStoreError>;

    /// Delete every record of a project, returning how many were removed
    async fn delete_project(&self, project_id: &str) -> Result<usize, VectorStoreError>;

    /// Number of records stored for a project
    async fn count(&self, project_id: &str) -> Result<usize, VectorStoreError>;
}

/// Cosine similarity of two vectors; zero when either has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Unit vector whose cosine similarity to `e0` (the first basis vector) is `similarity`
#[cfg(test)]
pub(crate) fn vector_with_similarity(dimension: usize, similarity: f32) -> Vec<f32> {
    let mut v = vec![0.0; dimension];
    v[0] = similarity;
    v[1] = (1.0 - similarity * similarity).sqrt();
    v
}

#[cfg(test)]
pub(crate) fn unit(dimension: usize) -> Vec<f32> {
    let mut v = vec![0.0; dimension];
    v[0] = 1.0;
    v
}
