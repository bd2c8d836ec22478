//! Summarize, embed and store repository documents
//!
//! Indexing is best effort. A document whose summary, embedding or write
//! fails is logged and left out; the run returns whatever was stored.

use crate::error::{LlmError, VectorStoreError};
use crate::llm::LlmGateway;
use crate::repository::Document;
use crate::store::{CodeEmbeddingRecord, VectorStore};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;

/// Stored in place of a summary the model returned blank
pub const EMPTY_SUMMARY: &str = "No summary generated";

const ASSET_EXTENSIONS: &[&str] = &[
    "svg", "png", "jpg", "jpeg", "gif", "ico", "webp", "bmp", "tiff",
];
const ASSET_DIRS: &[&str] = &["icons", "images"];

/// Whether a document is worth summarizing: image files and anything inside
/// an `icons` or `images` directory are not
pub fn is_indexable(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    if let Some((_, ext)) = lower.rsplit_once('.')
        && ASSET_EXTENSIONS.contains(&ext)
    {
        return false;
    }

    let mut components: Vec<&str> = lower.split('/').collect();
    components.pop();
    !components.iter().any(|c| ASSET_DIRS.contains(c))
}

/// Why a single document did not make it into the store
#[derive(Debug, Error)]
pub enum ItemFailure {
    #[error("summary failed: {0}")]
    Summary(LlmError),

    #[error("embedding failed: {0}")]
    Embedding(LlmError),

    #[error("write failed: {0}")]
    Write(VectorStoreError),
}

/// Batch sizes and truncation applied by [`EmbeddingIndexer`]
#[derive(Debug, Clone, Copy)]
pub struct IndexerLimits {
    /// Documents summarized and embedded concurrently
    pub embedding_batch_size: usize,
    /// Records written concurrently
    pub write_batch_size: usize,
    /// Characters of source included in the summary prompt
    pub summary_source_chars: usize,
}

impl From<&crate::config::IndexingConfig> for IndexerLimits {
    fn from(config: &crate::config::IndexingConfig) -> Self {
        Self {
            embedding_batch_size: config.embedding_batch_size.max(1),
            write_batch_size: config.write_batch_size.max(1),
            summary_source_chars: config.summary_source_chars,
        }
    }
}

pub struct EmbeddingIndexer {
    gateway: LlmGateway,
    store: Arc<dyn VectorStore>,
    limits: IndexerLimits,
}

impl EmbeddingIndexer {
    pub fn new(gateway: LlmGateway, store: Arc<dyn VectorStore>, limits: IndexerLimits) -> Self {
        Self {
            gateway,
            store,
            limits,
        }
    }

    /// Index `documents` for `project_id`, returning the records actually stored
    pub async fn index(
        &self,
        project_id: &str,
        documents: Vec<Document>,
    ) -> Vec<CodeEmbeddingRecord> {
        let total = documents.len();
        let documents: Vec<Document> = documents
            .into_iter()
            .filter(|d| is_indexable(&d.path))
            .collect();
        if documents.len() < total {
            tracing::info!(
                "Skipping {} asset files for project {}",
                total - documents.len(),
                project_id
            );
        }
        if documents.is_empty() {
            tracing::warn!("No indexable documents for project {}", project_id);
            return Vec::new();
        }

        // Summaries and embeddings, a bounded batch at a time
        let mut embedded = Vec::with_capacity(documents.len());
        let batches = documents.chunks(self.limits.embedding_batch_size);
        for (batch_idx, batch) in batches.enumerate() {
            let results =
                join_all(batch.iter().map(|doc| self.embed_document(project_id, doc))).await;

            for (doc, result) in batch.iter().zip(results) {
                match result {
                    Ok(record) => embedded.push(record),
                    Err(e) => tracing::warn!("Dropping {}: {}", doc.path, e),
                }
            }
            tracing::debug!(
                "Embedding batch {} done ({}/{} documents embedded)",
                batch_idx + 1,
                embedded.len(),
                documents.len()
            );
        }

        let embed_failures = documents.len() - embedded.len();
        if embed_failures > 0 {
            tracing::warn!(
                "{} of {} documents could not be summarized or embedded for project {}",
                embed_failures,
                documents.len(),
                project_id
            );
        }

        // Writes, a bounded batch at a time
        let mut stored = Vec::with_capacity(embedded.len());
        for batch in embedded.chunks(self.limits.write_batch_size) {
            let results = join_all(batch.iter().map(|record| async move {
                self.store
                    .upsert(record)
                    .await
                    .map_err(ItemFailure::Write)
            }))
            .await;

            for (record, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => stored.push(record.clone()),
                    Err(e) => tracing::error!("Failed to store {}: {}", record.file_name, e),
                }
            }
        }

        let write_failures = embedded.len() - stored.len();
        if write_failures > 0 {
            tracing::warn!(
                "{} embeddings failed to store for project {}",
                write_failures,
                project_id
            );
        }

        tracing::info!(
            "Indexed {} of {} documents for project {}",
            stored.len(),
            total,
            project_id
        );
        stored
    }

    async fn embed_document(
        &self,
        project_id: &str,
        doc: &Document,
    ) -> Result<CodeEmbeddingRecord, ItemFailure> {
        let summary = self
            .gateway
            .summarize_code(&doc.path, &doc.content, self.limits.summary_source_chars)
            .await
            .map_err(ItemFailure::Summary)?;

        let summary = match summary.trim() {
            "" => EMPTY_SUMMARY.to_string(),
            trimmed => trimmed.to_string(),
        };

        let embedding = self
            .gateway
            .embed(&summary)
            .await
            .map_err(ItemFailure::Embedding)?;

        Ok(CodeEmbeddingRecord::new(
            project_id,
            doc.path.clone(),
            doc.content.clone(),
            summary,
            embedding,
        ))
    }
}

#[cfg(test)]
mod tests;
