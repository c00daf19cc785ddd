//! External provider and store port interfaces.
//!
//! The application layer depends only on these traits; infrastructure
//! supplies the Redis, Neo4j, HTTP and filesystem adapters.

/// Embedding, graph store and vector index ports.
pub mod providers;
/// Job store and queue ports.
pub mod stores;

pub use providers::{
    EdgeBatchRow, EmbeddingProvider, GraphStore, NodeBatchResult, NodeBatchRow,
    VectorIndexProvider,
};
pub use stores::{JobQueue, JobStore};
