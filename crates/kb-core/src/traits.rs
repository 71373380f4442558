use crate::error::BackendError;
use crate::types::{Language, ScoredResult};

/// Text → embedding collaborator. Implementations may call a local model or a
/// remote service and may fail at any time.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Best-effort language detection; `Language::Unknown` is a valid answer.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Language;
}

/// Read-only lexical search over an immutable corpus snapshot.
pub trait LexicalSearcher: Send + Sync {
    fn len(&self) -> usize;
    fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredResult>, BackendError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-only nearest-neighbor search over an immutable corpus snapshot.
pub trait VectorSearcher: Send + Sync {
    fn len(&self) -> usize;
    /// Dimensionality of the indexed vectors; `None` when the index is empty.
    fn dim(&self) -> Option<usize>;
    fn search_vec(&self, query: &[f32], k: usize) -> Result<Vec<ScoredResult>, BackendError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
