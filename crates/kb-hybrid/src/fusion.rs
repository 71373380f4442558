//! Reciprocal Rank Fusion over the per-(method, variant) ranked lists.
//!
//! Score for chunk d = Σ 1/(k + rank_i) over every list i containing d, with
//! 1-based ranks. Raw backend scores are carried for provenance and the
//! vector threshold, never summed.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use kb_core::types::{ChunkId, Contribution, RetrievalMethod, ScoredResult};

/// One sub-query's output, best hit first.
#[derive(Debug, Clone)]
pub struct RankedList {
    pub method: RetrievalMethod,
    /// Index of the query variant (0 = original query).
    pub variant: usize,
    pub hits: Vec<ScoredResult>,
}

impl RankedList {
    pub fn new(method: RetrievalMethod, variant: usize, hits: Vec<ScoredResult>) -> Self {
        Self { method, variant, hits }
    }
}

/// A fused entry before its chunk payload is attached.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub chunk_id: ChunkId,
    pub fused_score: f64,
    pub methods: BTreeSet<RetrievalMethod>,
    pub contributions: Vec<Contribution>,
    pub best_vector_score: Option<f32>,
}

impl FusedCandidate {
    /// Surfaced by vector lists only, hence subject to the similarity threshold.
    pub fn is_vector_only(&self) -> bool {
        self.methods.len() == 1 && self.methods.contains(&RetrievalMethod::Vector)
    }

    pub fn list_count(&self) -> usize {
        self.contributions.len()
    }

    pub fn passes_threshold(&self, threshold: f32) -> bool {
        !self.is_vector_only() || self.best_vector_score.is_some_and(|s| s >= threshold)
    }
}

/// Fuse ranked lists. Output order: fused score desc, number of contributing
/// lists desc, chunk id asc. Within one list a repeated id only counts at its
/// first (best) rank.
pub fn rrf_fuse(lists: &[RankedList], k: usize) -> Vec<FusedCandidate> {
    let mut by_id: HashMap<&str, FusedCandidate> = HashMap::new();

    for list in lists {
        let mut seen: HashSet<&str> = HashSet::new();
        for (rank0, hit) in list.hits.iter().enumerate() {
            if !seen.insert(hit.chunk_id.as_str()) {
                continue;
            }
            let rank = rank0 + 1;
            let entry = by_id.entry(hit.chunk_id.as_str()).or_insert_with(|| FusedCandidate {
                chunk_id: hit.chunk_id.clone(),
                fused_score: 0.0,
                methods: BTreeSet::new(),
                contributions: Vec::new(),
                best_vector_score: None,
            });
            entry.methods.insert(list.method);
            entry.contributions.push(Contribution { method: list.method, variant: list.variant, rank, raw_score: hit.score });
            if list.method == RetrievalMethod::Vector {
                entry.best_vector_score = Some(entry.best_vector_score.map_or(hit.score, |s| s.max(hit.score)));
            }
        }
    }

    let mut fused: Vec<FusedCandidate> = by_id.into_values().collect();
    for c in &mut fused {
        c.fused_score = rrf_score(c.contributions.iter().map(|x| x.rank), k);
    }
    fused.sort_by(compare);
    fused
}

/// Sum of `1/(k + rank)`, added best rank first so equal rank multisets
/// give bit-identical scores whatever order the lists arrived in.
fn rrf_score(ranks: impl Iterator<Item = usize>, k: usize) -> f64 {
    let mut ranks: Vec<usize> = ranks.collect();
    ranks.sort_unstable();
    ranks.iter().map(|&r| 1.0 / (k + r) as f64).sum()
}

fn compare(a: &FusedCandidate, b: &FusedCandidate) -> Ordering {
    b.fused_score
        .partial_cmp(&a.fused_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.list_count().cmp(&a.list_count()))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(method: RetrievalMethod, variant: usize, ids: &[&str]) -> RankedList {
        let hits = ids
            .iter()
            .enumerate()
            .map(|(i, id)| ScoredResult::new(*id, 1.0 - i as f32 * 0.1, method))
            .collect();
        RankedList::new(method, variant, hits)
    }

    #[test]
    fn single_list_keeps_order() {
        let fused = rrf_fuse(&[list(RetrievalMethod::Vector, 0, &["a", "b"])], 60);
        assert_eq!(fused[0].chunk_id, "a");
        assert!((fused[0].fused_score - 1.0 / 61.0).abs() < 1e-12);
        assert!((fused[1].fused_score - 1.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn agreement_across_lists_boosts() {
        let fused = rrf_fuse(
            &[list(RetrievalMethod::Vector, 0, &["a", "b"]), list(RetrievalMethod::Lexical, 0, &["b", "c"])],
            60,
        );
        assert_eq!(fused[0].chunk_id, "b");
        assert_eq!(fused[0].list_count(), 2);
        assert_eq!(fused[0].methods.len(), 2);
        assert!(!fused[0].is_vector_only());
    }

    #[test]
    fn ties_prefer_more_lists_then_id() {
        // k=0 makes x (1/2 + 1/2) tie exactly with a and b (1/1).
        let fused = rrf_fuse(
            &[list(RetrievalMethod::Vector, 0, &["b", "x"]), list(RetrievalMethod::Lexical, 0, &["a", "x"])],
            0,
        );
        let ids: Vec<&str> = fused.iter().map(|f| f.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "a", "b"]);
    }

    #[test]
    fn equal_rank_sets_tie_on_id_regardless_of_list_order() {
        // a sits at ranks (1, 7, 2), b at (1, 2, 7).
        let fill = |n: usize| (0..n).map(|i| format!("f{i}")).collect::<Vec<_>>();
        let at = |id: &str, rank: usize| {
            let mut ids = fill(rank - 1);
            ids.push(id.to_string());
            ids
        };
        let lists: Vec<RankedList> = [("a", 1), ("a", 7), ("a", 2), ("b", 1), ("b", 2), ("b", 7)]
            .iter()
            .map(|(id, rank)| {
                let ids = at(id, *rank);
                let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
                list(RetrievalMethod::Lexical, 0, &refs)
            })
            .collect();
        let fused = rrf_fuse(&lists, 60);
        let pos = |id: &str| fused.iter().position(|c| c.chunk_id == id).unwrap();
        let (a, b) = (&fused[pos("a")], &fused[pos("b")]);
        assert_eq!(a.fused_score.to_bits(), b.fused_score.to_bits());
        assert!(pos("a") < pos("b"));
    }

    #[test]
    fn duplicate_ids_in_one_list_count_once() {
        let fused = rrf_fuse(&[list(RetrievalMethod::Lexical, 0, &["a", "a", "b"])], 60);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].fused_score - 1.0 / 61.0).abs() < 1e-12);
        assert_eq!(fused[0].contributions.len(), 1);
        assert!((fused[1].fused_score - 1.0 / 63.0).abs() < 1e-12, "b keeps its original rank");
    }

    #[test]
    fn best_vector_score_tracks_max_over_variants() {
        let mut v0 = list(RetrievalMethod::Vector, 0, &["a"]);
        v0.hits[0].score = 0.3;
        let mut v1 = list(RetrievalMethod::Vector, 1, &["a"]);
        v1.hits[0].score = 0.7;
        let fused = rrf_fuse(&[v0, v1], 60);
        assert_eq!(fused[0].best_vector_score, Some(0.7));
        assert!(fused[0].passes_threshold(0.5));
        assert!(!fused[0].passes_threshold(0.8));
    }

    #[test]
    fn lexical_hits_are_exempt_from_threshold() {
        let fused = rrf_fuse(&[list(RetrievalMethod::Lexical, 0, &["a"])], 60);
        assert_eq!(fused[0].best_vector_score, None);
        assert!(fused[0].passes_threshold(1.0));
    }
}
