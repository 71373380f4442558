use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::{ChunkId, RetrievalMethod};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of one retrieval backend call. Always distinct from "no results".
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("embedding call failed: {0}")]
    Embedding(String),

    #[error("embedder returned a {actual}-d vector, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector backend unavailable: {0}")]
    Unavailable(String),

    #[error("lexical index error: {0}")]
    Lexical(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("sub-query task aborted: {0}")]
    Task(String),
}

/// One (method, variant) sub-query that did not produce a list.
#[derive(Debug, Error)]
#[error("{method} sub-query for variant {variant} failed: {error}")]
pub struct SubQueryFailure {
    pub method: RetrievalMethod,
    pub variant: usize,
    #[source]
    pub error: BackendError,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("index not built: rebuild must succeed before retrieve")]
    IndexNotBuilt,

    #[error("all {} retrieval sub-queries failed", .failures.len())]
    TotalBackendFailure { failures: Vec<SubQueryFailure> },

    #[error("invalid retrieval request: {0}")]
    InvalidRequest(String),
}

/// Corpus build failure. The previously published snapshot keeps serving.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("chunk at position {0} has an empty id")]
    EmptyId(usize),

    #[error("duplicate chunk id '{0}'")]
    DuplicateId(ChunkId),

    #[error("chunk '{chunk_id}' has a {actual}-d embedding, expected {expected}")]
    DimensionMismatch { chunk_id: ChunkId, expected: usize, actual: usize },

    #[error("chunk '{0}' has no embedding and no embedder is configured")]
    MissingEmbedding(ChunkId),

    #[error("embedding batch failed: {0}")]
    Embedding(String),

    #[error("embedder returned {returned} vectors for {requested} texts")]
    EmbeddingCount { requested: usize, returned: usize },

    #[error("lexical index build failed: {0}")]
    Lexical(String),

    #[error("index invariant violated: {0}")]
    Invariant(String),

    #[error("rebuild task aborted: {0}")]
    Task(String),
}
