use anyhow::Result;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tantivy::collector::TopDocs;
use tantivy::query::BooleanQuery;
use tantivy::schema::{Field, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::{debug, info};

use kb_core::error::BackendError;
use kb_core::traits::LexicalSearcher;
use kb_core::types::{Chunk, RetrievalMethod, ScoredResult};

use crate::tokenize::{analyze, build_schema, register_tokenizer};

/// In-memory BM25 index over one immutable set of chunks.
///
/// Built once and never written to again; a new corpus means a new index.
pub struct LexicalIndex {
	searcher: Searcher,
	id_field: Field,
	text_field: Field,
	headings_field: Field,
	len: usize,
}

impl LexicalIndex {
	pub fn build(chunks: &[Chunk]) -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let id_field = schema.get_field("id")?;
		let source_field = schema.get_field("source")?;
		let text_field = schema.get_field("text")?;
		let headings_field = schema.get_field("headings")?;

		let mut writer: IndexWriter = index.writer_with_num_threads(1, 50_000_000)?;
		for c in chunks {
			writer.add_document(doc!(
				id_field => c.id.clone(),
				source_field => c.source.clone(),
				text_field => c.text.clone(),
				headings_field => c.heading_path.join(" "),
			))?;
		}
		writer.commit()?;

		let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		reader.reload()?;
		let searcher = reader.searcher();
		info!(chunks = chunks.len(), "built lexical index");
		Ok(Self { searcher, id_field, text_field, headings_field, len: chunks.len() })
	}

	fn query_terms(&self, query: &str) -> Vec<Term> {
		let unique: BTreeSet<String> = analyze(query).into_iter().collect();
		unique
			.iter()
			.flat_map(|t| {
				[Term::from_field_text(self.text_field, t), Term::from_field_text(self.headings_field, t)]
			})
			.collect()
	}

	fn run(&self, query: &str, limit: usize) -> Result<Vec<ScoredResult>> {
		let terms = self.query_terms(query);
		if terms.is_empty() {
			debug!(query, "query has no indexable terms");
			return Ok(vec![]);
		}
		let q = BooleanQuery::new_multiterms_query(terms);
		let top_docs = self.searcher.search(&q, &TopDocs::with_limit(limit.min(self.len)))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = self.searcher.doc(addr)?;
			let id = doc.get_first(self.id_field).and_then(|v| v.as_str()).unwrap_or("").to_string();
			hits.push(ScoredResult::new(id, score, RetrievalMethod::Lexical));
		}
		hits.sort_by(|a, b| {
			b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.chunk_id.cmp(&b.chunk_id))
		});
		Ok(hits)
	}
}

impl LexicalSearcher for LexicalIndex {
	fn len(&self) -> usize {
		self.len
	}

	fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredResult>, BackendError> {
		if limit == 0 || self.len == 0 {
			return Ok(vec![]);
		}
		self.run(query, limit).map_err(|e| BackendError::Lexical(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn chunk(id: &str, text: &str) -> Chunk {
		Chunk::new(id, text, "test.md")
	}

	#[test]
	fn stop_word_only_query_is_empty() {
		let index = LexicalIndex::build(&[chunk("a", "the leave policy")]).unwrap();
		assert!(index.search("the of and", 5).unwrap().is_empty());
	}

	#[test]
	fn headings_are_searchable() {
		let c = chunk("a", "Ten days per year.").with_heading_path(vec!["Sick Leave".into()]);
		let index = LexicalIndex::build(&[c, chunk("b", "Unrelated text")]).unwrap();
		let hits = index.search("sick", 5).unwrap();
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].chunk_id, "a");
	}

	#[test]
	fn zero_limit_returns_nothing() {
		let index = LexicalIndex::build(&[chunk("a", "leave")]).unwrap();
		assert!(index.search("leave", 0).unwrap().is_empty());
	}
}
