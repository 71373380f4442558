//! kb-hybrid
//!
//! Query-time half of the knowledge base: picks a retrieval strategy,
//! expands the query into variants, fans sub-queries out to the lexical and
//! vector indexes of the current corpus snapshot, and fuses the ranked lists
//! with reciprocal rank fusion.

pub mod context;
pub mod expand;
pub mod fusion;
pub mod health;
pub mod retriever;
pub mod snapshot;
pub mod strategy;

pub use context::format_context;
pub use expand::{Expansion, QueryExpander};
pub use fusion::{rrf_fuse, FusedCandidate, RankedList};
pub use health::{BackendHealth, HealthTracker};
pub use retriever::{BackendHealthReport, HybridRetriever, RebuildReport, RetrievalPlan, RetrieverStatus};
pub use snapshot::IndexedCorpus;
pub use strategy::{QueryFeatures, SelectionRule, StrategyDecision, StrategyPolicy, StrategySelector};
