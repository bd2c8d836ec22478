use super::*;
use crate::rate_limit::{RateLimitedExecutor, RetryPolicy};
use crate::store::{InMemoryVectorStore, SimilarityMatch};
use crate::test_support::FakeModel;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

const DIM: usize = 16;

fn limits() -> IndexerLimits {
    IndexerLimits {
        embedding_batch_size: 5,
        write_batch_size: 10,
        summary_source_chars: 1000,
    }
}

fn gateway(model: Arc<FakeModel>) -> LlmGateway {
    LlmGateway::new(
        model,
        Arc::new(RateLimitedExecutor::immediate()),
        RetryPolicy::default(),
    )
}

fn docs(paths: &[&str]) -> Vec<Document> {
    paths
        .iter()
        .map(|p| Document::new(*p, format!("// contents of {}", p)))
        .collect()
}

/// Store whose writes fail for selected files
struct FlakyStore {
    inner: InMemoryVectorStore,
    failing: Vec<String>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait::async_trait]
impl VectorStore for FlakyStore {
    async fn acquire(&self) -> Result<(), VectorStoreError> {
        self.inner.acquire().await
    }

    async fn release(&self) {
        self.inner.release().await
    }

    async fn upsert(&self, record: &CodeEmbeddingRecord) -> Result<(), VectorStoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&record.file_name) {
            return Err(VectorStoreError::WriteFailed {
                file_name: record.file_name.clone(),
                reason: "disk full".to_string(),
            });
        }
        self.inner.upsert(record).await
    }

    async fn search(
        &self,
        project_id: &str,
        query: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>, VectorStoreError> {
        self.inner
            .search(project_id, query, min_similarity, limit)
            .await
    }

    async fn delete_project(&self, project_id: &str) -> Result<usize, VectorStoreError> {
        self.inner.delete_project(project_id).await
    }

    async fn count(&self, project_id: &str) -> Result<usize, VectorStoreError> {
        self.inner.count(project_id).await
    }
}

#[test]
fn test_is_indexable() {
    assert!(is_indexable("src/main.rs"));
    assert!(is_indexable("README.md"));
    assert!(is_indexable("src/image_utils.py"));
    assert!(is_indexable("src/icons.ts"));
    assert!(!is_indexable("logo.svg"));
    assert!(!is_indexable("public/Logo.SVG"));
    assert!(!is_indexable("assets/photo.jpeg"));
    assert!(!is_indexable("public/icons/menu.tsx"));
    assert!(!is_indexable("docs/images/readme.md"));
}

#[tokio::test]
async fn test_indexes_every_document() {
    let model = Arc::new(FakeModel::new(DIM));
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = EmbeddingIndexer::new(gateway(model.clone()), store.clone(), limits());

    let records = indexer
        .index("p1", docs(&["src/a.rs", "src/b.rs", "README.md"]))
        .await;

    assert_eq!(records.len(), 3);
    assert_eq!(store.count("p1").await.unwrap(), 3);

    let stored = store.records("p1").await;
    let readme = stored.iter().find(|r| r.file_name == "README.md").unwrap();
    assert_eq!(readme.summary, FakeModel::summary_for("README.md"));
    assert_eq!(readme.source_code, "// contents of README.md");
    assert_eq!(readme.embedding.len(), DIM);
}

#[tokio::test]
async fn test_embedding_is_of_summary_not_source() {
    let model = Arc::new(FakeModel::new(DIM));
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = EmbeddingIndexer::new(gateway(model.clone()), store, limits());

    indexer.index("p1", docs(&["src/a.rs"])).await;

    assert_eq!(
        *model.embedded.lock().unwrap(),
        vec![FakeModel::summary_for("src/a.rs")]
    );
}

#[tokio::test]
async fn test_one_failed_embedding_drops_one_record() {
    let paths: Vec<String> = (0..7).map(|i| format!("src/f{i}.rs")).collect();
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();

    let model = Arc::new(FakeModel::new(DIM));
    model
        .failing_embeds
        .lock()
        .unwrap()
        .push(FakeModel::summary_for("src/f3.rs"));
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = EmbeddingIndexer::new(gateway(model), store.clone(), limits());

    let records = indexer.index("p1", docs(&path_refs)).await;

    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|r| r.file_name != "src/f3.rs"));
    assert_eq!(store.count("p1").await.unwrap(), 6);
}

#[tokio::test]
async fn test_failed_summary_drops_document() {
    let model = Arc::new(FakeModel::new(DIM));
    model
        .failing_prompts
        .lock()
        .unwrap()
        .push("src/broken.rs".to_string());
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = EmbeddingIndexer::new(gateway(model.clone()), store, limits());

    let records = indexer
        .index("p1", docs(&["src/ok.rs", "src/broken.rs"]))
        .await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].file_name, "src/ok.rs");
    // No embedding is requested for a document without a summary
    assert_eq!(model.embedded.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_assets_are_never_summarized() {
    let mut paths: Vec<String> = (0..10).map(|i| format!("src/mod{i}.ts")).collect();
    paths.push("public/logo.svg".to_string());
    paths.push("src/assets/arrow.svg".to_string());
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();

    let model = Arc::new(FakeModel::new(DIM));
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = EmbeddingIndexer::new(gateway(model.clone()), store.clone(), limits());

    let records = indexer.index("p1", docs(&path_refs)).await;

    assert_eq!(model.generated.lock().unwrap().len(), 10);
    assert_eq!(records.len(), 10);
    assert_eq!(store.count("p1").await.unwrap(), 10);
}

#[tokio::test]
async fn test_failed_write_is_excluded() {
    let model = Arc::new(FakeModel::new(DIM));
    let store = Arc::new(FlakyStore {
        inner: InMemoryVectorStore::new(DIM),
        failing: vec!["src/b.rs".to_string()],
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let indexer = EmbeddingIndexer::new(gateway(model), store.clone(), limits());

    let records = indexer
        .index("p1", docs(&["src/a.rs", "src/b.rs", "src/c.rs"]))
        .await;

    let names: Vec<&str> = records.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, vec!["src/a.rs", "src/c.rs"]);
    assert_eq!(store.inner.count("p1").await.unwrap(), 2);
}

#[tokio::test]
async fn test_write_batches_are_bounded() {
    let paths: Vec<String> = (0..25).map(|i| format!("src/f{i}.rs")).collect();
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();

    let model = Arc::new(FakeModel::new(DIM));
    let store = Arc::new(FlakyStore {
        inner: InMemoryVectorStore::new(DIM),
        failing: Vec::new(),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let indexer = EmbeddingIndexer::new(gateway(model), store.clone(), limits());

    let records = indexer.index("p1", docs(&path_refs)).await;

    assert_eq!(records.len(), 25);
    let peak = store.peak.load(Ordering::SeqCst);
    assert!(peak <= 10, "peak concurrent writes was {}", peak);
}

#[tokio::test]
async fn test_output_order_follows_input() {
    let model = Arc::new(FakeModel::new(DIM));
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = EmbeddingIndexer::new(gateway(model), store, limits());

    let input = ["z.rs", "a.rs", "m.rs", "b.rs", "y.rs", "c.rs"];
    let records = indexer.index("p1", docs(&input)).await;

    let names: Vec<&str> = records.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, input.to_vec());
}

/// Model that returns a blank summary
struct BlankSummaries {
    inner: FakeModel,
    seen: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl crate::llm::LanguageModel for BlankSummaries {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok("   ".to_string())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.seen.lock().unwrap().push(text.to_string());
        self.inner.embed(text).await
    }

    async fn stream(&self, prompt: &str) -> Result<crate::llm::TextStream, LlmError> {
        self.inner.stream(prompt).await
    }

    fn embedding_dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "blank"
    }
}

#[tokio::test]
async fn test_blank_summary_is_replaced() {
    let model = Arc::new(BlankSummaries {
        inner: FakeModel::new(DIM),
        seen: Mutex::new(Vec::new()),
    });
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let gateway = LlmGateway::new(
        model.clone(),
        Arc::new(RateLimitedExecutor::immediate()),
        RetryPolicy::default(),
    );
    let indexer = EmbeddingIndexer::new(gateway, store, limits());

    let records = indexer.index("p1", docs(&["src/a.rs"])).await;

    assert_eq!(records[0].summary, EMPTY_SUMMARY);
    assert_eq!(*model.seen.lock().unwrap(), vec![EMPTY_SUMMARY.to_string()]);
}

#[tokio::test]
async fn test_empty_input() {
    let model = Arc::new(FakeModel::new(DIM));
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = EmbeddingIndexer::new(gateway(model.clone()), store, limits());

    assert!(indexer.index("p1", Vec::new()).await.is_empty());
    assert!(indexer.index("p1", docs(&["a.png"])).await.is_empty());
    assert!(model.generated.lock().unwrap().is_empty());
}
