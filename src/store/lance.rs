//! LanceDB vector store
//!
//! One table holds every project's records. The vector is written in the
//! same merge-insert as the scalar columns, keyed on the record id, so a
//! record never exists without its vector and re-indexing a file replaces
//! the previous row.

use super::{CodeEmbeddingRecord, SimilarityMatch, VectorStore};
use crate::error::VectorStoreError;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    types::Float32Type,
};
use arrow_schema::{DataType, Field, Schema};
use futures::stream::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::sync::Arc;
use tokio::sync::Mutex;

const TABLE_NAME: &str = "code_embeddings";

#[derive(Default)]
struct ConnectionState {
    table: Option<Table>,
    holders: usize,
}

/// LanceDB-backed [`VectorStore`] (embedded, no server required)
pub struct LanceVectorStore {
    db_path: String,
    dimension: usize,
    state: Mutex<ConnectionState>,
    // Concurrent merge-inserts on one table conflict at commit time
    write_lock: Mutex<()>,
}

impl LanceVectorStore {
    pub fn new(db_path: impl Into<String>, dimension: usize) -> Self {
        Self {
            db_path: db_path.into(),
            dimension,
            state: Mutex::new(ConnectionState::default()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("id", DataType::Utf8, false),
            Field::new("project_id", DataType::Utf8, false),
            Field::new("file_name", DataType::Utf8, false),
            Field::new("source_code", DataType::Utf8, false),
            Field::new("summary", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    async fn connect(&self) -> Result<Connection, VectorStoreError> {
        lancedb::connect(&self.db_path)
            .execute()
            .await
            .map_err(|e| VectorStoreError::ConnectionFailed(e.to_string()))
    }

    /// Open the table, creating it when `create` is set and it does not exist yet
    async fn open_table(
        &self,
        connection: &Connection,
        create: bool,
    ) -> Result<Option<Table>, VectorStoreError> {
        let names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| VectorStoreError::ConnectionFailed(e.to_string()))?;

        if !names.iter().any(|n| n == TABLE_NAME) {
            if !create {
                return Ok(None);
            }

            let schema = self.schema();
            let batches = RecordBatchIterator::new(
                vec![RecordBatch::new_empty(schema.clone())]
                    .into_iter()
                    .map(Ok),
                schema,
            );
            let table = connection
                .create_table(TABLE_NAME, Box::new(batches))
                .execute()
                .await
                .map_err(|e| VectorStoreError::ConnectionFailed(e.to_string()))?;
            tracing::info!(
                "Created table '{}' (dimension {}) at {}",
                TABLE_NAME,
                self.dimension,
                self.db_path
            );
            return Ok(Some(table));
        }

        connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map(Some)
            .map_err(|e| VectorStoreError::ConnectionFailed(e.to_string()))
    }

    /// The table of the held connection, or one from a short-lived connection
    async fn table(&self, create: bool) -> Result<Option<Table>, VectorStoreError> {
        let mut state = self.state.lock().await;
        if let Some(table) = &state.table {
            return Ok(Some(table.clone()));
        }

        let connection = self.connect().await?;
        let table = self.open_table(&connection, create).await?;
        if state.holders > 0 {
            state.table = table.clone();
        }
        Ok(table)
    }

    fn record_batch(&self, record: &CodeEmbeddingRecord) -> Result<RecordBatch, VectorStoreError> {
        let vector = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            std::iter::once(Some(record.embedding.iter().copied().map(Some))),
            self.dimension as i32,
        );
        let created_at = record.created_at.to_rfc3339();

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(vector),
                Arc::new(StringArray::from(vec![record.id.as_str()])),
                Arc::new(StringArray::from(vec![record.project_id.as_str()])),
                Arc::new(StringArray::from(vec![record.file_name.as_str()])),
                Arc::new(StringArray::from(vec![record.source_code.as_str()])),
                Arc::new(StringArray::from(vec![record.summary.as_str()])),
                Arc::new(StringArray::from(vec![created_at.as_str()])),
            ],
        )
        .map_err(|e| VectorStoreError::WriteFailed {
            file_name: record.file_name.clone(),
            reason: e.to_string(),
        })
    }
}

fn project_filter(project_id: &str) -> String {
    format!("project_id = '{}'", project_id.replace('\'', "''"))
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a StringArray, VectorStoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| VectorStoreError::SearchFailed(format!("Missing or invalid column {}", name)))
}

#[async_trait::async_trait]
impl VectorStore for LanceVectorStore {
    async fn acquire(&self) -> Result<(), VectorStoreError> {
        let mut state = self.state.lock().await;
        if state.table.is_none() {
            tracing::info!("Connecting to LanceDB at: {}", self.db_path);
            let connection = self.connect().await?;
            state.table = self.open_table(&connection, true).await?;
        }
        state.holders += 1;
        Ok(())
    }

    async fn release(&self) {
        let mut state = self.state.lock().await;
        state.holders = state.holders.saturating_sub(1);
        if state.holders == 0 && state.table.take().is_some() {
            tracing::debug!("Closed LanceDB connection at: {}", self.db_path);
        }
    }

    async fn upsert(&self, record: &CodeEmbeddingRecord) -> Result<(), VectorStoreError> {
        if record.embedding.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: record.embedding.len(),
            });
        }

        let table = self
            .table(true)
            .await?
            .ok_or(VectorStoreError::NotConnected)?;
        let batch = self.record_batch(record)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema);

        let _guard = self.write_lock.lock().await;
        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(batches))
            .await
            .map_err(|e| VectorStoreError::WriteFailed {
                file_name: record.file_name.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!("Stored embedding for {}", record.file_name);
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

        let Some(table) = self.table(false).await? else {
            return Ok(Vec::new());
        };

        let stream = table
            .vector_search(query.to_vec())
            .map_err(|e| VectorStoreError::SearchFailed(e.to_string()))?
            .distance_type(DistanceType::Cosine)
            .only_if(project_filter(project_id))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| VectorStoreError::SearchFailed(e.to_string()))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| VectorStoreError::SearchFailed(e.to_string()))?;

        let mut matches = Vec::new();
        for batch in &batches {
            let file_names = string_column(batch, "file_name")?;
            let summaries = string_column(batch, "summary")?;
            let sources = string_column(batch, "source_code")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| {
                    VectorStoreError::SearchFailed("Missing _distance column".to_string())
                })?;

            for i in 0..batch.num_rows() {
                // Cosine distance is 1 - cosine similarity
                let similarity = 1.0 - distances.value(i);
                if similarity > min_similarity {
                    matches.push(SimilarityMatch {
                        file_name: file_names.value(i).to_string(),
                        summary: summaries.value(i).to_string(),
                        source_code: sources.value(i).to_string(),
                        similarity,
                    });
                }
            }
        }

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn delete_project(&self, project_id: &str) -> Result<usize, VectorStoreError> {
        let Some(table) = self.table(false).await? else {
            return Ok(0);
        };
        let filter = project_filter(project_id);

        let count = table
            .count_rows(Some(filter.clone()))
            .await
            .map_err(|e| VectorStoreError::DeleteFailed(e.to_string()))?;

        let _guard = self.write_lock.lock().await;
        table
            .delete(&filter)
            .await
            .map_err(|e| VectorStoreError::DeleteFailed(e.to_string()))?;

        tracing::info!("Deleted {} records of project {}", count, project_id);
        Ok(count)
    }

    async fn count(&self, project_id: &str) -> Result<usize, VectorStoreError> {
        let Some(table) = self.table(false).await? else {
            return Ok(0);
        };
        table
            .count_rows(Some(project_filter(project_id)))
            .await
            .map_err(|e| VectorStoreError::SearchFailed(e.to_string()))
    }
}

impl std::fmt::Debug for LanceVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceVectorStore")
            .field("db_path", &self.db_path)
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests;
