use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{debug, info};

use kb_core::error::{BackendError, RebuildError};
use kb_core::traits::{Embedder, VectorSearcher};
use kb_core::types::{Chunk, ScoredResult};

/// Text query → embedding → nearest chunks.
///
/// Every failure comes back as a typed `BackendError`; an empty `Ok` always
/// means "searched, nothing close".
#[derive(Clone)]
pub struct VectorAdapter {
    embedder: Option<Arc<dyn Embedder>>,
    index: Arc<dyn VectorSearcher>,
}

impl VectorAdapter {
    pub fn new(embedder: Option<Arc<dyn Embedder>>, index: Arc<dyn VectorSearcher>) -> Self {
        Self { embedder, index }
    }

    pub fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredResult>, BackendError> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| BackendError::Unavailable("no embedder configured".into()))?;
        if self.index.is_empty() || k == 0 {
            return Ok(vec![]);
        }
        let q = embedder.embed(query).map_err(|e| BackendError::Embedding(format!("{e:#}")))?;
        if let Some(expected) = self.index.dim() {
            if q.len() != expected {
                return Err(BackendError::DimensionMismatch { expected, actual: q.len() });
            }
        }
        let hits = self.index.search_vec(&q, k)?;
        debug!(k, hits = hits.len(), "vector search");
        Ok(hits)
    }
}

/// Progress bar in the workspace's usual style, hidden when `show` is false.
pub fn embedding_progress(len: usize, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Fill in embeddings for chunks that lack one, in batches. Returns how many
/// chunks were embedded.
pub fn embed_missing(
    embedder: Option<&dyn Embedder>,
    chunks: &mut [Chunk],
    batch_size: usize,
    pb: &ProgressBar,
) -> Result<usize, RebuildError> {
    let missing: Vec<usize> = chunks.iter().enumerate().filter(|(_, c)| c.embedding.is_none()).map(|(i, _)| i).collect();
    if missing.is_empty() {
        return Ok(0);
    }
    let embedder = embedder.ok_or_else(|| RebuildError::MissingEmbedding(chunks[missing[0]].id.clone()))?;
    pb.set_length(missing.len() as u64);
    for batch in missing.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|&i| chunks[i].text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).map_err(|e| RebuildError::Embedding(format!("{e:#}")))?;
        if vectors.len() != texts.len() {
            return Err(RebuildError::EmbeddingCount { requested: texts.len(), returned: vectors.len() });
        }
        for (&i, v) in batch.iter().zip(vectors) {
            chunks[i].embedding = Some(v);
        }
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();
    info!(embedded = missing.len(), "embedded chunks");
    Ok(missing.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat::FlatVectorIndex;

    struct Axis;

    impl Embedder for Axis {
        fn dim(&self) -> usize { 2 }
        fn max_len(&self) -> usize { 64 }
        fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| if t.contains("leave") { vec![1.0, 0.0] } else { vec![0.0, 1.0] }).collect())
        }
    }

    struct Broken;

    impl Embedder for Broken {
        fn dim(&self) -> usize { 2 }
        fn max_len(&self) -> usize { 64 }
        fn embed_batch(&self, _: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("model offline")
        }
    }

    fn index() -> Arc<dyn VectorSearcher> {
        Arc::new(FlatVectorIndex::build(vec![("leave".into(), vec![1.0, 0.0]), ("other".into(), vec![0.0, 1.0])]).unwrap())
    }

    #[test]
    fn embeds_and_searches() {
        let adapter = VectorAdapter::new(Some(Arc::new(Axis)), index());
        let hits = adapter.search("annual leave", 1).unwrap();
        assert_eq!(hits[0].chunk_id, "leave");
    }

    #[test]
    fn failures_are_typed() {
        let none = VectorAdapter::new(None, index());
        assert!(matches!(none.search("x", 3), Err(BackendError::Unavailable(_))));
        let broken = VectorAdapter::new(Some(Arc::new(Broken)), index());
        assert!(matches!(broken.search("x", 3), Err(BackendError::Embedding(m)) if m.contains("model offline")));
    }

    #[test]
    fn embed_missing_skips_present_vectors() {
        let mut chunks = vec![
            Chunk::new("a", "leave rules", "a.md"),
            Chunk::new("b", "other", "a.md").with_embedding(vec![9.0, 9.0]),
        ];
        let n = embed_missing(Some(&Axis), &mut chunks, 8, &ProgressBar::hidden()).unwrap();
        assert_eq!(n, 1);
        assert_eq!(chunks[0].embedding.as_deref(), Some(&[1.0, 0.0][..]));
        assert_eq!(chunks[1].embedding.as_deref(), Some(&[9.0, 9.0][..]));
    }

    #[test]
    fn embed_missing_without_embedder_fails() {
        let mut chunks = vec![Chunk::new("a", "text", "a.md")];
        let err = embed_missing(None, &mut chunks, 8, &ProgressBar::hidden()).unwrap_err();
        assert!(matches!(err, RebuildError::MissingEmbedding(id) if id == "a"));
    }
}
