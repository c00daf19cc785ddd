//! Provider ports consumed by the indexing pipeline.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::entities::ChunkRecord;
use crate::error::Result;
use crate::value_objects::CollectionId;

/// Batched text-to-vector computation against a remote model.
///
/// Implementations perform a single API call per invocation; batching and
/// retry policy live in the application-layer batcher.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Name of the embedding model in use.
    fn model(&self) -> &str;

    /// Short provider identifier for logs.
    fn provider_name(&self) -> &str;
}

/// One row of a parameterised node upsert batch.
#[derive(Debug, Clone)]
pub struct NodeBatchRow {
    /// Identity fields matched by the MERGE clause.
    pub key: BTreeMap<String, String>,
    /// Properties set after the merge; nulls already stripped.
    pub props: BTreeMap<String, Value>,
    /// Caller-side correlation hash returned with the element id.
    pub key_hash: String,
}

/// Per-row result of a node upsert batch.
#[derive(Debug, Clone)]
pub struct NodeBatchResult {
    /// Correlation hash from the submitted row.
    pub key_hash: String,
    /// Stable element id assigned by the backend.
    pub element_id: String,
}

/// One row of a parameterised edge upsert batch.
#[derive(Debug, Clone)]
pub struct EdgeBatchRow {
    /// Identity fields of the start node.
    pub start: BTreeMap<String, String>,
    /// Identity fields of the end node.
    pub end: BTreeMap<String, String>,
    /// Edge properties; nulls already stripped.
    pub props: BTreeMap<String, Value>,
}

/// Transactional graph database session.
///
/// Statements are parameterised UNWIND/MERGE/MATCH/SET Cypher built by the
/// graph writer; each call executes as a single transaction.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Execute a node upsert batch, returning element ids per row.
    async fn upsert_nodes(
        &self,
        statement: &str,
        rows: Vec<NodeBatchRow>,
    ) -> Result<Vec<NodeBatchResult>>;

    /// Execute an edge upsert batch.
    async fn upsert_edges(&self, statement: &str, rows: Vec<EdgeBatchRow>) -> Result<()>;

    /// Execute a standalone statement (schema migrations).
    async fn run_statement(&self, statement: &str) -> Result<()>;
}

/// Builder of the per-collection dense vector index.
#[async_trait]
pub trait VectorIndexProvider: Send + Sync {
    /// Build, normalise and persist the index plus its metadata sidecar.
    ///
    /// `embeddings` rows align one-to-one with `records`; both follow
    /// chunk order.
    async fn build_index(
        &self,
        collection: &CollectionId,
        embeddings: Vec<Vec<f32>>,
        records: Vec<ChunkRecord>,
    ) -> Result<()>;
}
