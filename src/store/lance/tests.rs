use super::*;
use crate::store::{unit, vector_with_similarity};
use tempfile::TempDir;

const DIM: usize = 8;

fn store(temp_dir: &TempDir) -> LanceVectorStore {
    let db_path = temp_dir
        .path()
        .join("lancedb")
        .to_string_lossy()
        .to_string();
    LanceVectorStore::new(db_path, DIM)
}

fn record(project: &str, file: &str, similarity: f32) -> CodeEmbeddingRecord {
    CodeEmbeddingRecord::new(
        project,
        file,
        format!("fn {}() {{}}", file.replace('.', "_")),
        format!("Summary of {}", file),
        vector_with_similarity(DIM, similarity),
    )
}

#[test]
fn test_project_filter_escapes_quotes() {
    assert_eq!(project_filter("abc"), "project_id = 'abc'");
    assert_eq!(project_filter("o'brien"), "project_id = 'o''brien'");
}

#[tokio::test]
async fn test_search_before_any_write_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let store = store(&temp_dir);

    let matches = store.search("p", &unit(DIM), 0.5, 10).await.unwrap();
    assert!(matches.is_empty());
    assert_eq!(store.count("p").await.unwrap(), 0);
    assert_eq!(store.delete_project("p").await.unwrap(), 0);
}

#[tokio::test]
async fn test_acquire_creates_table_and_release_closes() {
    let temp_dir = TempDir::new().unwrap();
    let store = store(&temp_dir);

    store.acquire().await.unwrap();
    assert!(store.state.lock().await.table.is_some());

    store.acquire().await.unwrap();
    store.release().await;
    assert!(store.state.lock().await.table.is_some());

    store.release().await;
    assert!(store.state.lock().await.table.is_none());
}

#[tokio::test]
async fn test_upsert_and_search() {
    let temp_dir = TempDir::new().unwrap();
    let store = store(&temp_dir);
    store.acquire().await.unwrap();

    store.upsert(&record("p", "close.rs", 0.95)).await.unwrap();
    store.upsert(&record("p", "near.rs", 0.7)).await.unwrap();
    store.upsert(&record("p", "far.rs", 0.2)).await.unwrap();

    let matches = store.search("p", &unit(DIM), 0.5, 10).await.unwrap();
    let names: Vec<&str> = matches.iter().map(|m| m.file_name.as_str()).collect();
    assert_eq!(names, vec!["close.rs", "near.rs"]);
    assert!((matches[0].similarity - 0.95).abs() < 1e-4);
    assert_eq!(matches[0].summary, "Summary of close.rs");
    assert_eq!(matches[0].source_code, "fn close_rs() {}");

    store.release().await;
}

#[tokio::test]
async fn test_similarity_below_threshold_returns_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = store(&temp_dir);

    store.upsert(&record("p", "weak.rs", 0.42)).await.unwrap();
    let matches = store.search("p", &unit(DIM), 0.5, 10).await.unwrap();
    assert!(matches.is_empty());
}

#[tokio::test]
async fn test_upsert_is_idempotent_per_file() {
    let temp_dir = TempDir::new().unwrap();
    let store = store(&temp_dir);
    store.acquire().await.unwrap();

    store.upsert(&record("p", "main.rs", 0.9)).await.unwrap();
    let mut again = record("p", "main.rs", 0.9);
    again.summary = "Second run".to_string();
    store.upsert(&again).await.unwrap();

    assert_eq!(store.count("p").await.unwrap(), 1);
    let matches = store.search("p", &unit(DIM), 0.5, 10).await.unwrap();
    assert_eq!(matches[0].summary, "Second run");

    store.release().await;
}

#[tokio::test]
async fn test_projects_are_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let store = store(&temp_dir);
    store.acquire().await.unwrap();

    store.upsert(&record("alpha", "main.rs", 0.9)).await.unwrap();
    store.upsert(&record("alpha", "lib.rs", 0.8)).await.unwrap();
    store.upsert(&record("beta", "main.rs", 0.9)).await.unwrap();

    assert_eq!(
        store.search("beta", &unit(DIM), 0.5, 10).await.unwrap().len(),
        1
    );
    assert_eq!(store.delete_project("alpha").await.unwrap(), 2);
    assert_eq!(store.count("alpha").await.unwrap(), 0);
    assert_eq!(store.count("beta").await.unwrap(), 1);

    store.release().await;
}

#[tokio::test]
async fn test_rejects_wrong_dimensions() {
    let temp_dir = TempDir::new().unwrap();
    let store = store(&temp_dir);

    let mut bad = record("p", "main.rs", 0.9);
    bad.embedding.truncate(3);
    assert!(matches!(
        store.upsert(&bad).await,
        Err(VectorStoreError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        store.search("p", &[1.0, 0.0], 0.5, 10).await,
        Err(VectorStoreError::DimensionMismatch { .. })
    ));
}
