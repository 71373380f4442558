use std::sync::Arc;

use kb_core::error::BackendError;
use kb_core::traits::VectorSearcher;
use kb_core::types::{Chunk, Language};
use kb_vector::{LanceSnapshotStore, LanceVectorIndex};
use tempfile::TempDir;

fn chunk(id: &str, seq: usize, v: [f32; 3]) -> Chunk {
    Chunk::new(id, format!("text of {id}"), "policies.md")
        .with_seq(seq)
        .with_heading_path(vec!["Policies".into(), "Leave".into()])
        .with_language(Language::English)
        .with_embedding(v.to_vec())
}

#[tokio::test]
async fn save_then_load_round_trips_chunks() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let store = LanceSnapshotStore::open(tmp.path(), "chunks").await?;
    assert!(store.load().await?.is_empty(), "missing table loads empty");

    let chunks = vec![chunk("b", 1, [0.0, 1.0, 0.0]), chunk("a", 0, [1.0, 0.0, 0.0])];
    assert_eq!(store.save(&chunks).await?, 2);

    let loaded = store.load().await?;
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].id, "a", "ordered by source then seq");
    assert_eq!(loaded[0].heading_path, vec!["Policies".to_string(), "Leave".to_string()]);
    assert_eq!(loaded[0].language, Some(Language::English));
    assert_eq!(loaded[1].embedding.as_deref(), Some(&[0.0, 1.0, 0.0][..]));
    Ok(())
}

#[tokio::test]
async fn save_replaces_previous_snapshot() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let store = LanceSnapshotStore::open(tmp.path(), "chunks").await?;
    store.save(&[chunk("a", 0, [1.0, 0.0, 0.0]), chunk("b", 1, [0.0, 1.0, 0.0])]).await?;
    store.save(&[chunk("c", 0, [0.0, 0.0, 1.0])]).await?;
    let ids: Vec<String> = store.load().await?.into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec!["c"]);
    Ok(())
}

#[tokio::test]
async fn chunks_without_embeddings_are_rejected() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let store = LanceSnapshotStore::open(tmp.path(), "chunks").await?;
    assert!(store.save(&[Chunk::new("a", "no vector", "x.md")]).await.is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lance_index_ranks_by_cosine_similarity() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let store = LanceSnapshotStore::open(tmp.path(), "chunks").await?;
    store
        .save(&[chunk("a", 0, [1.0, 0.0, 0.0]), chunk("b", 1, [0.6, 0.8, 0.0]), chunk("c", 2, [0.0, 0.0, 1.0])])
        .await?;
    let index = Arc::new(LanceVectorIndex::open(&store).await?);
    assert_eq!(index.len(), 3);
    assert_eq!(index.dim(), Some(3));

    let searcher = index.clone();
    let hits = tokio::task::spawn_blocking(move || searcher.search_vec(&[1.0, 0.0, 0.0], 2)).await??;
    let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!((hits[0].score - 1.0).abs() < 1e-4);
    assert!((hits[1].score - 0.6).abs() < 1e-4);

    let searcher = index.clone();
    let err = tokio::task::spawn_blocking(move || searcher.search_vec(&[1.0, 0.0], 2)).await?.unwrap_err();
    assert!(matches!(err, BackendError::DimensionMismatch { expected: 3, actual: 2 }));
    Ok(())
}

#[tokio::test]
async fn empty_store_has_no_vectors() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let store = LanceSnapshotStore::open(tmp.path(), "chunks").await?;
    assert!(!store.exists().await?);
    store.save(&[chunk("a", 0, [1.0, 0.0, 0.0])]).await?;
    assert!(store.exists().await?);
    Ok(())
}
