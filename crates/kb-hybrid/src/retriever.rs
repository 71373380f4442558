use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use kb_core::config::RetrievalSettings;
use kb_core::error::{BackendError, Error, RebuildError, RetrievalError, SubQueryFailure};
use kb_core::language::ScriptLanguageDetector;
use kb_core::traits::{Embedder, LanguageDetector, LexicalSearcher};
use kb_core::types::{
    Chunk, FusedResult, Language, RetrievalMethod, RetrievalRequest, ScoredResult, Strategy,
};
use kb_vector::{embed_missing, embedding_progress, VectorAdapter};

use crate::expand::{normalize, QueryExpander};
use crate::fusion::{rrf_fuse, FusedCandidate, RankedList};
use crate::health::{BackendHealth, HealthTracker};
use crate::snapshot::{validate_ids, IndexedCorpus};
use crate::strategy::{QueryFeatures, SelectionRule, StrategyPolicy, StrategySelector};

/// Everything decided about a query before any index is touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalPlan {
    pub query_language: Language,
    pub corpus_language: Language,
    pub strategy: Strategy,
    pub rule: SelectionRule,
    pub clarify: bool,
    pub variants: Vec<String>,
    pub features: QueryFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendHealthReport {
    pub vector: BackendHealth,
    pub lexical: BackendHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrieverStatus {
    pub chunk_count: usize,
    pub last_build_time: Option<DateTime<Utc>>,
    pub generation: u64,
    pub dimension: Option<usize>,
    pub dominant_language: Option<Language>,
    pub backend_health: BackendHealthReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildReport {
    pub generation: u64,
    pub chunk_count: usize,
    /// Chunks that arrived without an embedding and were embedded here.
    pub embedded: usize,
    pub dimension: Option<usize>,
    pub elapsed_ms: u64,
}

type SubQueryOutcome = (RetrievalMethod, usize, Result<Vec<ScoredResult>, BackendError>);

/// Hybrid lexical + vector retriever over an atomically swapped corpus.
///
/// `retrieve` never blocks on `rebuild`: readers take the current snapshot
/// and keep it for the whole call, while a rebuild prepares the next one
/// off to the side and publishes it with a single store.
pub struct HybridRetriever {
    settings: RetrievalSettings,
    embedder: Option<Arc<dyn Embedder>>,
    detector: Arc<dyn LanguageDetector>,
    expander: QueryExpander,
    selector: StrategySelector,
    corpus: ArcSwapOption<IndexedCorpus>,
    rebuild_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    vector_health: HealthTracker,
    lexical_health: HealthTracker,
    embed_batch_size: usize,
    show_progress: bool,
}

impl HybridRetriever {
    pub fn new(settings: RetrievalSettings, embedder: Option<Arc<dyn Embedder>>) -> Result<Self, Error> {
        settings.validate()?;
        let detector: Arc<dyn LanguageDetector> = Arc::new(ScriptLanguageDetector::default());
        let cooldown = settings.unhealthy_cooldown();
        Ok(Self {
            expander: QueryExpander::new(settings.max_variants, detector.clone()),
            selector: StrategySelector::new(StrategyPolicy::from(&settings)),
            vector_health: HealthTracker::new("vector", settings.unhealthy_after_failures, cooldown),
            lexical_health: HealthTracker::new("lexical", settings.unhealthy_after_failures, cooldown),
            settings,
            embedder,
            detector,
            corpus: ArcSwapOption::empty(),
            rebuild_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            embed_batch_size: 32,
            show_progress: false,
        })
    }

    pub fn with_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.expander = QueryExpander::new(self.settings.max_variants, detector.clone());
        self.detector = detector;
        self
    }

    pub fn with_embed_batch_size(mut self, batch_size: usize) -> Self {
        self.embed_batch_size = batch_size.max(1);
        self
    }

    /// Draw an indicatif bar while rebuild embeds chunks.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Request with this retriever's default `top_k` and threshold.
    pub fn request(&self, query: impl Into<String>) -> RetrievalRequest {
        RetrievalRequest::new(query, self.settings.top_k, self.settings.similarity_threshold)
    }

    fn vector_available(&self) -> bool {
        self.embedder.is_some() && self.vector_health.is_available()
    }

    /// Strategy, variants and clarification flag for `query`, without searching.
    pub fn plan(&self, query: &str, requested: Option<Strategy>) -> RetrievalPlan {
        let corpus_language = self.corpus.load_full().map_or(Language::Unknown, |c| c.dominant_language());
        self.plan_for(corpus_language, query, requested, true)
    }

    fn plan_for(&self, corpus_language: Language, query: &str, requested: Option<Strategy>, expand: bool) -> RetrievalPlan {
        let mut expansion = self.expander.expand(query, corpus_language);
        if !expand {
            expansion.variants.truncate(1);
        }
        let content_tokens = kb_text::analyze(&normalize(query)).len();
        let features = QueryFeatures::extract(query, expansion.language, content_tokens, self.vector_available());
        let decision = self.selector.select(&features, requested);
        info!(
            query_language = %expansion.language,
            strategy = %decision.strategy,
            rule = decision.rule.as_str(),
            variants = expansion.variants.len(),
            clarify = decision.clarify,
            "retrieval plan"
        );
        RetrievalPlan {
            query_language: expansion.language,
            corpus_language,
            strategy: decision.strategy,
            rule: decision.rule,
            clarify: decision.clarify,
            variants: expansion.variants,
            features,
        }
    }

    pub async fn retrieve(&self, request: RetrievalRequest) -> Result<Vec<FusedResult>, RetrievalError> {
        validate_request(&request)?;
        let corpus = self.corpus.load_full().ok_or(RetrievalError::IndexNotBuilt)?;
        if corpus.is_empty() {
            debug!(generation = corpus.generation(), "empty corpus");
            return Ok(vec![]);
        }

        let plan = self.plan_for(corpus.dominant_language(), &request.query, request.strategy, request.expand);
        let fetch = self.settings.fetch_count(request.top_k);
        let timeout = self.settings.subquery_timeout();

        let mut tasks = Vec::with_capacity(plan.variants.len() * plan.strategy.methods().len());
        for (variant, text) in plan.variants.iter().enumerate() {
            for &method in plan.strategy.methods() {
                tasks.push(self.sub_query(&corpus, method, variant, text.clone(), fetch, timeout));
            }
        }
        let sub_queries = tasks.len();
        let outcomes = join_all(tasks).await;

        let mut lists = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        let mut per_method: BTreeMap<RetrievalMethod, (usize, Option<String>)> = BTreeMap::new();
        for (method, variant, result) in outcomes {
            let entry = per_method.entry(method).or_insert((0, None));
            match result {
                Ok(hits) => {
                    entry.0 += 1;
                    lists.push(RankedList::new(method, variant, hits));
                }
                Err(error) => {
                    warn!(method = %method, variant, error = %error, "sub-query failed");
                    entry.1 = Some(error.to_string());
                    failures.push(SubQueryFailure { method, variant, error });
                }
            }
        }
        for (method, (succeeded, last_error)) in per_method {
            let tracker = match method {
                RetrievalMethod::Vector => &self.vector_health,
                RetrievalMethod::Lexical => &self.lexical_health,
            };
            match (succeeded, last_error) {
                (0, Some(err)) => tracker.record_failure(&err),
                _ => tracker.record_success(),
            }
        }

        if lists.is_empty() {
            warn!(sub_queries, "every retrieval sub-query failed");
            return Err(RetrievalError::TotalBackendFailure { failures });
        }

        let fused = rrf_fuse(&lists, self.settings.rrf_k);
        let mut threshold = request.similarity_threshold;
        let mut results = attach(&corpus, &fused, threshold, request.top_k);
        if let Some(floor) = self.settings.adaptive_floor {
            if results.len() < self.settings.adaptive_min_results.min(request.top_k) && floor < threshold {
                warn!(threshold, floor, kept = results.len(), "few results, relaxing similarity threshold");
                threshold = floor;
                results = attach(&corpus, &fused, threshold, request.top_k);
            }
        }

        info!(
            generation = corpus.generation(),
            strategy = %plan.strategy,
            sub_queries,
            failed = failures.len(),
            candidates = fused.len(),
            threshold,
            results = results.len(),
            "retrieval complete"
        );
        Ok(results)
    }

    fn sub_query(
        &self,
        corpus: &Arc<IndexedCorpus>,
        method: RetrievalMethod,
        variant: usize,
        text: String,
        fetch: usize,
        timeout: Duration,
    ) -> impl std::future::Future<Output = SubQueryOutcome> + Send + 'static {
        let job: Box<dyn FnOnce() -> Result<Vec<ScoredResult>, BackendError> + Send> = match method {
            RetrievalMethod::Lexical => {
                let index = corpus.lexical().clone();
                Box::new(move || index.search(&text, fetch))
            }
            RetrievalMethod::Vector => {
                let adapter = VectorAdapter::new(self.embedder.clone(), corpus.vector().clone());
                Box::new(move || adapter.search(&text, fetch))
            }
        };
        async move {
            let handle = tokio::task::spawn_blocking(job);
            let result = match tokio::time::timeout(timeout, handle).await {
                Err(_) => Err(BackendError::Timeout(timeout)),
                Ok(Err(join)) => Err(BackendError::Task(join.to_string())),
                Ok(Ok(r)) => r,
            };
            (method, variant, result)
        }
    }

    /// Build a new corpus from `chunks` and publish it. On failure the
    /// previous snapshot keeps serving.
    pub async fn rebuild(&self, chunks: Vec<Chunk>) -> Result<RebuildReport, RebuildError> {
        let _guard = self.rebuild_lock.lock().await;
        let start = Instant::now();
        let chunk_count = chunks.len();
        match self.build_corpus(chunks).await {
            Ok((corpus, embedded)) => {
                let dimension = corpus.dimension();
                let generation = self.install(corpus);
                let report = RebuildReport {
                    generation,
                    chunk_count,
                    embedded,
                    dimension,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                };
                info!(generation, chunks = chunk_count, embedded, elapsed_ms = report.elapsed_ms, "corpus rebuilt");
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, chunks = chunk_count, "rebuild failed, previous snapshot still serving");
                Err(e)
            }
        }
    }

    async fn build_corpus(&self, mut chunks: Vec<Chunk>) -> Result<(IndexedCorpus, usize), RebuildError> {
        validate_ids(&chunks)?;
        let embedder = self.embedder.clone();
        let detector = self.detector.clone();
        let batch_size = self.embed_batch_size;
        let show = self.show_progress;
        tokio::task::spawn_blocking(move || {
            let pb = embedding_progress(chunks.len(), show);
            let embedded = embed_missing(embedder.as_deref(), &mut chunks, batch_size, &pb)?;
            let corpus = IndexedCorpus::build(chunks, detector.as_ref())?;
            if let (Some(embedder), Some(actual)) = (embedder.as_deref(), corpus.dimension()) {
                if embedder.dim() != actual {
                    return Err(RebuildError::Invariant(format!(
                        "corpus embeddings are {actual}-d but the embedder produces {}-d vectors",
                        embedder.dim()
                    )));
                }
            }
            Ok((corpus, embedded))
        })
        .await
        .map_err(|e| RebuildError::Task(e.to_string()))?
    }

    fn install(&self, corpus: IndexedCorpus) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.corpus.store(Some(Arc::new(corpus.with_generation(generation))));
        generation
    }

    /// Publish a corpus assembled elsewhere (e.g. from custom searchers).
    pub async fn publish(&self, corpus: IndexedCorpus) -> u64 {
        let _guard = self.rebuild_lock.lock().await;
        let generation = self.install(corpus);
        info!(generation, "corpus published");
        generation
    }

    pub fn status(&self) -> RetrieverStatus {
        let corpus = self.corpus.load_full();
        let vector = if self.embedder.is_none() {
            BackendHealth {
                healthy: false,
                consecutive_failures: 0,
                cooling_down: false,
                last_error: Some("no embedder configured".to_string()),
            }
        } else {
            self.vector_health.snapshot()
        };
        RetrieverStatus {
            chunk_count: corpus.as_ref().map_or(0, |c| c.len()),
            last_build_time: corpus.as_ref().map(|c| c.built_at()),
            generation: corpus.as_ref().map_or(0, |c| c.generation()),
            dimension: corpus.as_ref().and_then(|c| c.dimension()),
            dominant_language: corpus.as_ref().map(|c| c.dominant_language()),
            backend_health: BackendHealthReport { vector, lexical: self.lexical_health.snapshot() },
        }
    }
}

fn validate_request(request: &RetrievalRequest) -> Result<(), RetrievalError> {
    if request.top_k == 0 {
        return Err(RetrievalError::InvalidRequest("top_k must be positive".into()));
    }
    if !(0.0..=1.0).contains(&request.similarity_threshold) {
        return Err(RetrievalError::InvalidRequest(format!(
            "similarity_threshold {} outside [0, 1]",
            request.similarity_threshold
        )));
    }
    Ok(())
}

/// Threshold, payload and top-k over fused candidates. Ids the corpus does
/// not know are dropped.
fn attach(corpus: &IndexedCorpus, fused: &[FusedCandidate], threshold: f32, top_k: usize) -> Vec<FusedResult> {
    fused
        .iter()
        .filter(|c| c.passes_threshold(threshold))
        .filter_map(|c| {
            let chunk = corpus.get(&c.chunk_id)?;
            Some(FusedResult {
                chunk_id: c.chunk_id.clone(),
                fused_score: c.fused_score,
                methods: c.methods.clone(),
                contributions: c.contributions.clone(),
                best_vector_score: c.best_vector_score,
                chunk: chunk.clone(),
            })
        })
        .take(top_k)
        .collect()
}
