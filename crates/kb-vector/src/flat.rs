use std::cmp::Ordering;
use tracing::info;

use kb_core::error::{BackendError, RebuildError};
use kb_core::traits::VectorSearcher;
use kb_core::types::{ChunkId, RetrievalMethod, ScoredResult};

/// Exact cosine search over L2-normalised vectors held in one flat buffer.
///
/// Similarity is the cosine clamped to `[0, 1]`, so anti-correlated vectors
/// score 0. Results are ordered by similarity, then chunk id.
#[derive(Debug, Clone)]
pub struct FlatVectorIndex {
    ids: Vec<ChunkId>,
    data: Vec<f32>,
    dim: usize,
}

impl FlatVectorIndex {
    pub fn build(entries: Vec<(ChunkId, Vec<f32>)>) -> Result<Self, RebuildError> {
        let dim = entries.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut ids = Vec::with_capacity(entries.len());
        let mut data = Vec::with_capacity(entries.len() * dim);
        for (id, mut v) in entries {
            if v.len() != dim || dim == 0 {
                return Err(RebuildError::DimensionMismatch { chunk_id: id, expected: dim, actual: v.len() });
            }
            normalize(&mut v);
            data.extend_from_slice(&v);
            ids.push(id);
        }
        info!(vectors = ids.len(), dim, "built flat vector index");
        Ok(Self { ids, data, dim })
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }
}

impl VectorSearcher for FlatVectorIndex {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn dim(&self) -> Option<usize> {
        (!self.ids.is_empty()).then_some(self.dim)
    }

    fn search_vec(&self, query: &[f32], k: usize) -> Result<Vec<ScoredResult>, BackendError> {
        if self.ids.is_empty() || k == 0 {
            return Ok(vec![]);
        }
        if query.len() != self.dim {
            return Err(BackendError::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        let mut q = query.to_vec();
        normalize(&mut q);
        let mut scored: Vec<(usize, f32)> = (0..self.ids.len())
            .map(|i| {
                let dot: f32 = self.row(i).iter().zip(&q).map(|(a, b)| a * b).sum();
                (i, dot.clamp(0.0, 1.0))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| self.ids[a.0].cmp(&self.ids[b.0]))
        });
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(i, s)| ScoredResult::new(self.ids[i].clone(), s, RetrievalMethod::Vector))
            .collect())
    }
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
