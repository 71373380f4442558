//! Domain types shared by the lexical, vector and fusion layers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;

pub type ChunkId = String;

/// Language tag attached to chunks and detected for queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "zh")]
    Chinese,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "multi")]
    Mixed,
    Unknown,
}

impl Language {
    pub fn tag(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Chinese => "zh",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::Mixed => "multi",
            Language::Unknown => "unknown",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "en" => Some(Language::English),
            "zh" => Some(Language::Chinese),
            "es" => Some(Language::Spanish),
            "fr" => Some(Language::French),
            "multi" => Some(Language::Mixed),
            "unknown" => Some(Language::Unknown),
            _ => None,
        }
    }

    /// Scripts that are not whitespace-delimited.
    pub fn is_cjk(self) -> bool {
        matches!(self, Language::Chinese)
    }

    /// `Unknown` and `Mixed` never drive translation decisions.
    pub fn is_definite(self) -> bool {
        !matches!(self, Language::Mixed | Language::Unknown)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A unit of retrievable text, immutable once ingested.
///
/// - `id`: globally unique chunk identifier
/// - `source`: stable source document identity (usually the file path)
/// - `heading_path`: document title followed by the section headings
/// - `seq`: position of the chunk within its source document
/// - `embedding`: produced externally; filled in during rebuild when absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub source: String,
    #[serde(default)]
    pub heading_path: Vec<String>,
    #[serde(default)]
    pub seq: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

impl Chunk {
    pub fn new(id: impl Into<ChunkId>, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source: source.into(),
            heading_path: Vec::new(),
            seq: 0,
            embedding: None,
            language: None,
        }
    }

    pub fn with_heading_path(mut self, path: Vec<String>) -> Self {
        self.heading_path = path;
        self
    }

    pub fn with_seq(mut self, seq: usize) -> Self {
        self.seq = seq;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Document title, falling back to the source identifier.
    pub fn title(&self) -> &str {
        self.heading_path.first().map(String::as_str).unwrap_or(&self.source)
    }
}

/// Which retrieval method produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    Vector,
    Lexical,
}

impl RetrievalMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RetrievalMethod::Vector => "vector",
            RetrievalMethod::Lexical => "lexical",
        }
    }
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The minimal surface returned by a single retrieval call.
///
/// `score` is method-specific: vector hits carry a similarity in [0,1],
/// lexical hits an unbounded BM25 relevance. Higher is always better, but
/// the two scales are not comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub method: RetrievalMethod,
}

impl ScoredResult {
    pub fn new(chunk_id: impl Into<ChunkId>, score: f32, method: RetrievalMethod) -> Self {
        Self { chunk_id: chunk_id.into(), score, method }
    }
}

/// Retrieval strategy, either requested by the caller or chosen per query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    VectorOnly,
    LexicalOnly,
    Hybrid,
}

impl Strategy {
    /// Methods dispatched for every query variant under this strategy.
    pub fn methods(self) -> &'static [RetrievalMethod] {
        match self {
            Strategy::VectorOnly => &[RetrievalMethod::Vector],
            Strategy::LexicalOnly => &[RetrievalMethod::Lexical],
            Strategy::Hybrid => &[RetrievalMethod::Vector, RetrievalMethod::Lexical],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::VectorOnly => "vector",
            Strategy::LexicalOnly => "lexical",
            Strategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vector" | "vector_only" => Ok(Strategy::VectorOnly),
            "lexical" | "lexical_only" | "bm25" => Ok(Strategy::LexicalOnly),
            "hybrid" => Ok(Strategy::Hybrid),
            other => Err(Error::InvalidConfig(format!("unknown retrieval strategy '{other}'"))),
        }
    }
}

/// One retrieval call: ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub query: String,
    pub strategy: Option<Strategy>,
    pub top_k: usize,
    pub similarity_threshold: f32,
    /// Search expanded variants too; `false` searches the query as given.
    pub expand: bool,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, top_k: usize, similarity_threshold: f32) -> Self {
        Self { query: query.into(), strategy: None, top_k, similarity_threshold, expand: true }
    }

    pub fn with_expansion(mut self, expand: bool) -> Self {
        self.expand = expand;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// A single ranked list's vote for a fused result.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub method: RetrievalMethod,
    /// Index of the query variant that produced the list (0 = original query).
    pub variant: usize,
    /// 1-based rank within that list.
    pub rank: usize,
    pub raw_score: f32,
}

/// Output unit of the hybrid retriever. Each `chunk_id` appears at most once
/// per result sequence.
#[derive(Debug, Clone)]
pub struct FusedResult {
    pub chunk_id: ChunkId,
    pub fused_score: f64,
    pub methods: BTreeSet<RetrievalMethod>,
    pub contributions: Vec<Contribution>,
    /// Best vector similarity among the contributions, if any list was vector.
    pub best_vector_score: Option<f32>,
    pub chunk: Arc<Chunk>,
}

impl FusedResult {
    /// Number of ranked lists the chunk appeared in.
    pub fn list_count(&self) -> usize {
        self.contributions.len()
    }

    pub fn is_lexical_only(&self) -> bool {
        !self.methods.contains(&RetrievalMethod::Vector)
    }
}
