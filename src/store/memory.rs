use super::{CodeEmbeddingRecord, SimilarityMatch, VectorStore, cosine_similarity};
use crate::error::VectorStoreError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Vector store kept entirely in memory
///
/// Search is an exact scan, which is plenty for tests and small projects.
#[derive(Debug)]
pub struct InMemoryVectorStore {
    dimension: usize,
    // Keyed by record id, which is unique per (project, file)
    records: RwLock<HashMap<String, CodeEmbeddingRecord>>,
    holders: AtomicUsize,
    acquisitions: AtomicUsize,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(HashMap::new()),
            holders: AtomicUsize::new(0),
            acquisitions: AtomicUsize::new(0),
        }
    }

    /// Connections acquired and not yet released
    pub fn open_connections(&self) -> usize {
        self.holders.load(Ordering::SeqCst)
    }

    /// Total number of `acquire` calls so far
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Snapshot of every record of a project, ordered by file name
    pub async fn records(&self, project_id: &str) -> Vec<CodeEmbeddingRecord> {
        let mut records: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        records
    }
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn acquire(&self) -> Result<(), VectorStoreError> {
        self.holders.fetch_add(1, Ordering::SeqCst);
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self) {
        let _ = self
            .holders
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    async fn upsert(&self, record: &CodeEmbeddingRecord) -> Result<(), VectorStoreError> {
        if record.embedding.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: record.embedding.len(),
            });
        }
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn search(
        &self,
        project_id: &str,
        query: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>, VectorStoreError> {
        if query.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let records = self.records.read().await;
        let mut matches: Vec<SimilarityMatch> = records
            .values()
            .filter(|r| r.project_id == project_id)
            .filter_map(|r| {
                let similarity = cosine_similarity(query, &r.embedding);
                (similarity > min_similarity).then(|| SimilarityMatch {
                    file_name: r.file_name.clone(),
                    summary: r.summary.clone(),
                    source_code: r.source_code.clone(),
                    similarity,
                })
            })
            .collect();

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn delete_project(&self, project_id: &str) -> Result<usize, VectorStoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.project_id != project_id);
        Ok(before - records.len())
    }

    async fn count(&self, project_id: &str) -> Result<usize, VectorStoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.project_id == project_id)
            .count())
    }
}
