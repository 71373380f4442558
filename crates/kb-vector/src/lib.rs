//! kb-vector
//!
//! Vector side of retrieval: an exact flat cosine index, the adapter that
//! turns query text into a nearest-neighbour search through an `Embedder`,
//! batch embedding for corpus builds, and (feature `lance`) a LanceDB store
//! for embedded chunk snapshots plus a searcher that queries it directly.

pub mod adapter;
pub mod flat;
#[cfg(feature = "lance")]
pub mod lance_search;
#[cfg(feature = "lance")]
pub mod store;

pub use adapter::{embed_missing, embedding_progress, VectorAdapter};
pub use flat::FlatVectorIndex;
#[cfg(feature = "lance")]
pub use lance_search::LanceVectorIndex;
#[cfg(feature = "lance")]
pub use store::LanceSnapshotStore;
