use std::sync::Arc;

use indicatif::ProgressBar;
use kb_core::traits::{Embedder, VectorSearcher};
use kb_core::types::{Chunk, RetrievalMethod};
use kb_embed::HashEmbedder;
use kb_vector::{embed_missing, FlatVectorIndex, VectorAdapter};

fn corpus() -> Vec<Chunk> {
    vec![
        Chunk::new("c1", "annual leave request procedure", "leave.md"),
        Chunk::new("c2", "badge reader network error", "errors.md"),
        Chunk::new("c3", "expense report reimbursement", "finance.md"),
    ]
}

#[test]
fn hash_embedded_corpus_finds_overlapping_chunk() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(256));
    let mut chunks = corpus();
    let embedded = embed_missing(Some(embedder.as_ref()), &mut chunks, 2, &ProgressBar::hidden()).expect("embed");
    assert_eq!(embedded, 3);

    let entries = chunks.iter().map(|c| (c.id.clone(), c.embedding.clone().unwrap_or_default())).collect();
    let index = Arc::new(FlatVectorIndex::build(entries).expect("build"));
    assert_eq!(index.dim(), Some(256));

    let adapter = VectorAdapter::new(Some(embedder), index);
    let hits = adapter.search("leave request", 3).expect("search");
    assert_eq!(hits[0].chunk_id, "c1");
    assert!(hits.iter().all(|h| h.method == RetrievalMethod::Vector));
    assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn query_embedder_dimension_must_match_index() {
    let index = Arc::new(FlatVectorIndex::build(vec![("a".into(), vec![1.0; 8])]).expect("build"));
    let adapter = VectorAdapter::new(Some(Arc::new(HashEmbedder::new(16))), index);
    let err = adapter.search("anything", 3).unwrap_err();
    assert!(err.to_string().contains("16-d"));
}
