//! kb-text
//!
//! BM25 lexical index over chunk texts, built in RAM with Tantivy. The
//! analyzer in `tokenize` splits Latin-script text on word boundaries and
//! CJK runs into character bigrams, so the same index serves English and
//! Chinese material. See `examples/search.rs` for an ad-hoc query tool.

pub mod index;
pub mod tokenize;

pub use index::LexicalIndex;
pub use tokenize::analyze;
