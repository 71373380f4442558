//! kb-core
//!
//! Shared vocabulary for the retrieval workspace: chunk and result types,
//! the collaborator traits (`Embedder`, `LanguageDetector`, searchers), the
//! error taxonomy, Figment-backed configuration, a script-based language
//! detector and the markdown document source.

pub mod config;
pub mod data_processor;
pub mod error;
pub mod language;
pub mod traits;
pub mod types;
