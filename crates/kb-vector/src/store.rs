//! LanceDB persistence for embedded chunks.
//!
//! A snapshot table holds one row per chunk with its embedding, so a process
//! can restart and `rebuild` without calling the embedder again. The table is
//! replaced wholesale on every save.

use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::{Array, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use kb_core::types::{Chunk, Language};

pub const DEFAULT_TABLE: &str = "chunks";

pub fn snapshot_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("heading_path", DataType::Utf8, false),
        Field::new("seq", DataType::Int32, false),
        Field::new("language", DataType::Utf8, true),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
    ]))
}

pub struct LanceSnapshotStore {
    db: Connection,
    table_name: String,
}

impl LanceSnapshotStore {
    pub async fn open(db_path: &Path, table_name: &str) -> Result<Self> {
        let db = connect(db_path.to_string_lossy().as_ref()).execute().await?;
        Ok(Self { db, table_name: table_name.to_string() })
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.db.table_names().execute().await?.contains(&self.table_name))
    }

    pub(crate) async fn table(&self) -> Result<lancedb::Table> {
        Ok(self.db.open_table(&self.table_name).execute().await?)
    }

    /// Replace the stored snapshot. Every chunk must carry an embedding of the
    /// same dimensionality.
    pub async fn save(&self, chunks: &[Chunk]) -> Result<usize> {
        let batch = chunks_to_record_batch(chunks)?;
        if self.exists().await? {
            let t = self.table().await?;
            t.delete("true").await?;
            if let Some(batch) = batch {
                let schema = batch.schema();
                let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
                t.add(reader).execute().await?;
            }
        } else if let Some(batch) = batch {
            let schema = batch.schema();
            let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
            self.db.create_table(&self.table_name, reader).execute().await?;
        }
        info!(table = %self.table_name, chunks = chunks.len(), "saved chunk snapshot");
        Ok(chunks.len())
    }

    /// All stored chunks ordered by (source, seq). A missing table loads empty.
    pub async fn load(&self) -> Result<Vec<Chunk>> {
        if !self.exists().await? {
            return Ok(vec![]);
        }
        let t = self.table().await?;
        let mut stream = t.query().execute().await?;
        let mut chunks = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            chunks.extend(record_batch_to_chunks(&batch)?);
        }
        chunks.sort_by(|a, b| a.source.cmp(&b.source).then(a.seq.cmp(&b.seq)).then_with(|| a.id.cmp(&b.id)));
        info!(table = %self.table_name, chunks = chunks.len(), "loaded chunk snapshot");
        Ok(chunks)
    }
}

fn chunks_to_record_batch(chunks: &[Chunk]) -> Result<Option<RecordBatch>> {
    let Some(first) = chunks.first() else { return Ok(None) };
    let dim = first.embedding.as_ref().map(Vec::len).ok_or_else(|| anyhow!("chunk '{}' has no embedding", first.id))?;
    let mut ids = Vec::new(); let mut sources = Vec::new(); let mut texts = Vec::new(); let mut headings = Vec::new();
    let mut seqs = Vec::new(); let mut languages = Vec::new(); let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
    for c in chunks {
        let v = c.embedding.as_ref().ok_or_else(|| anyhow!("chunk '{}' has no embedding", c.id))?;
        if v.len() != dim {
            return Err(anyhow!("chunk '{}' has a {}-d embedding, expected {}", c.id, v.len(), dim));
        }
        ids.push(c.id.clone());
        sources.push(c.source.clone());
        texts.push(c.text.clone());
        headings.push(serde_json::to_string(&c.heading_path)?);
        seqs.push(i32::try_from(c.seq)?);
        languages.push(c.language.map(|l| l.tag().to_string()));
        vectors.push(Some(v.iter().map(|&x| Some(x)).collect()));
    }
    let dim = i32::try_from(dim)?;
    let batch = RecordBatch::try_new(snapshot_schema(dim), vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(StringArray::from(sources)),
        Arc::new(StringArray::from(texts)),
        Arc::new(StringArray::from(headings)),
        Arc::new(Int32Array::from(seqs)),
        Arc::new(StringArray::from(languages)),
        Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
    ])?;
    Ok(Some(batch))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("missing {name} column"))
}

fn record_batch_to_chunks(batch: &RecordBatch) -> Result<Vec<Chunk>> {
    let ids = string_column(batch, "id")?;
    let sources = string_column(batch, "source")?;
    let texts = string_column(batch, "text")?;
    let headings = string_column(batch, "heading_path")?;
    let languages = string_column(batch, "language")?;
    let seqs = batch.column_by_name("seq").and_then(|c| c.as_any().downcast_ref::<Int32Array>()).ok_or_else(|| anyhow!("missing seq column"))?;
    let vectors = batch.column_by_name("vector").and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>()).ok_or_else(|| anyhow!("missing vector column"))?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let heading_path: Vec<String> = serde_json::from_str(headings.value(i))?;
        let mut chunk = Chunk::new(ids.value(i), texts.value(i), sources.value(i))
            .with_heading_path(heading_path)
            .with_seq(usize::try_from(seqs.value(i))?);
        if !languages.is_null(i) {
            chunk.language = Language::from_tag(languages.value(i));
        }
        if vectors.is_valid(i) {
            let list = vectors.value(i);
            chunk.embedding = Some(list.as_primitive::<arrow_array::types::Float32Type>().values().to_vec());
        }
        out.push(chunk);
    }
    Ok(out)
}
