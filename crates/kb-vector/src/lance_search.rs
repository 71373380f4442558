use anyhow::{anyhow, Result};
use arrow_array::{Float32Array, StringArray};
use arrow_schema::DataType;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::cmp::Ordering;
use tokio::runtime::Handle;
use tracing::{debug, info};

use kb_core::error::BackendError;
use kb_core::traits::VectorSearcher;
use kb_core::types::{RetrievalMethod, ScoredResult};

use crate::store::LanceSnapshotStore;

/// Nearest-neighbour search served straight from a LanceDB snapshot table.
///
/// `search_vec` blocks on the runtime it was opened on, so it must run on a
/// blocking thread (the retriever calls it from `spawn_blocking`), never
/// inside an async task.
pub struct LanceVectorIndex {
    table: Table,
    handle: Handle,
    len: usize,
    dim: Option<usize>,
}

impl LanceVectorIndex {
    pub async fn open(store: &LanceSnapshotStore) -> Result<Self> {
        let handle = Handle::try_current()?;
        let table = store.table().await?;
        let len = table.count_rows(None).await?;
        let schema = table.schema().await?;
        let dim = match schema.field_with_name("vector")?.data_type() {
            DataType::FixedSizeList(_, d) => Some(usize::try_from(*d)?),
            other => return Err(anyhow!("vector column has type {other:?}")),
        };
        info!(rows = len, dim, "opened lance vector index");
        Ok(Self { table, handle, len, dim: if len == 0 { None } else { dim } })
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredResult>> {
        let mut stream = self
            .table
            .vector_search(query.to_vec())?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            let ids = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow!("missing id column"))?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow!("missing _distance column"))?;
            for i in 0..batch.num_rows() {
                let score = (1.0 - distances.value(i)).clamp(0.0, 1.0);
                hits.push(ScoredResult::new(ids.value(i), score, RetrievalMethod::Vector));
            }
        }
        hits.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

impl VectorSearcher for LanceVectorIndex {
    fn len(&self) -> usize {
        self.len
    }

    fn dim(&self) -> Option<usize> {
        self.dim
    }

    fn search_vec(&self, query: &[f32], k: usize) -> Result<Vec<ScoredResult>, BackendError> {
        if self.len == 0 || k == 0 {
            return Ok(vec![]);
        }
        if let Some(expected) = self.dim {
            if query.len() != expected {
                return Err(BackendError::DimensionMismatch { expected, actual: query.len() });
            }
        }
        let hits = self
            .handle
            .block_on(self.nearest(query, k))
            .map_err(|e| BackendError::Unavailable(format!("lance search failed: {e:#}")))?;
        debug!(k, hits = hits.len(), "lance vector search");
        Ok(hits)
    }
}
