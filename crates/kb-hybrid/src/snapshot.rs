use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kb_core::error::RebuildError;
use kb_core::language::ScriptLanguageDetector;
use kb_core::traits::{LanguageDetector, LexicalSearcher, VectorSearcher};
use kb_core::types::{Chunk, ChunkId, Language};
use kb_text::LexicalIndex;
use kb_vector::FlatVectorIndex;

/// One immutable generation of the searchable corpus: the chunks plus a
/// lexical and a vector index built from exactly the same ids.
pub struct IndexedCorpus {
    chunks: HashMap<ChunkId, Arc<Chunk>>,
    lexical: Arc<dyn LexicalSearcher>,
    vector: Arc<dyn VectorSearcher>,
    generation: u64,
    built_at: DateTime<Utc>,
    dimension: Option<usize>,
    dominant_language: Language,
}

/// Empty ids and duplicates reject the whole corpus.
pub fn validate_ids(chunks: &[Chunk]) -> Result<(), RebuildError> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(chunks.len());
    for (i, c) in chunks.iter().enumerate() {
        if c.id.trim().is_empty() {
            return Err(RebuildError::EmptyId(i));
        }
        if !seen.insert(c.id.as_str()) {
            return Err(RebuildError::DuplicateId(c.id.clone()));
        }
    }
    Ok(())
}

impl IndexedCorpus {
    /// Build both indexes. Every chunk must already carry an embedding.
    pub fn build(chunks: Vec<Chunk>, detector: &dyn LanguageDetector) -> Result<Self, RebuildError> {
        validate_ids(&chunks)?;
        let mut entries = Vec::with_capacity(chunks.len());
        for c in &chunks {
            let v = c.embedding.clone().ok_or_else(|| RebuildError::MissingEmbedding(c.id.clone()))?;
            entries.push((c.id.clone(), v));
        }
        let vector = FlatVectorIndex::build(entries)?;
        let lexical = LexicalIndex::build(&chunks).map_err(|e| RebuildError::Lexical(format!("{e:#}")))?;
        Self::from_parts(chunks, Arc::new(lexical), Arc::new(vector), detector)
    }

    /// Assemble a corpus from prebuilt searchers, checking they cover the
    /// chunk set one to one.
    pub fn from_parts(
        chunks: Vec<Chunk>,
        lexical: Arc<dyn LexicalSearcher>,
        vector: Arc<dyn VectorSearcher>,
        detector: &dyn LanguageDetector,
    ) -> Result<Self, RebuildError> {
        validate_ids(&chunks)?;
        if lexical.len() != chunks.len() || vector.len() != chunks.len() {
            return Err(RebuildError::Invariant(format!(
                "{} chunks but lexical index has {} and vector index has {}",
                chunks.len(),
                lexical.len(),
                vector.len()
            )));
        }
        let dominant_language = ScriptLanguageDetector::dominant(
            chunks.iter().map(|c| c.language.unwrap_or_else(|| detector.detect(&c.text))),
        );
        let dimension = vector.dim();
        let chunks = chunks.into_iter().map(|c| (c.id.clone(), Arc::new(c))).collect();
        Ok(Self { chunks, lexical, vector, generation: 0, built_at: Utc::now(), dimension, dominant_language })
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Chunk>> {
        self.chunks.get(id)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn lexical(&self) -> &Arc<dyn LexicalSearcher> {
        &self.lexical
    }

    pub fn vector(&self) -> &Arc<dyn VectorSearcher> {
        &self.vector
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn dominant_language(&self) -> Language {
        self.dominant_language
    }
}
