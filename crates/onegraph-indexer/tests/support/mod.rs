//! In-memory test doubles for the pipeline's ports.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use onegraph_domain::CollectionId;
use onegraph_domain::entities::{ChunkRecord, IndexJob, JobState};
use onegraph_domain::error::{Error, Result};
use onegraph_domain::ports::{
    EdgeBatchRow, EmbeddingProvider, GraphStore, JobQueue, JobStore, NodeBatchResult, NodeBatchRow,
    VectorIndexProvider,
};
use onegraph_indexer::{EmbeddingBatcher, GraphWriter, IndexingPipeline, SchemaValidator};

/// Job store keeping every saved snapshot for trajectory assertions.
#[derive(Default)]
pub struct MemoryJobStore {
    states: Mutex<HashMap<String, JobState>>,
    pub trajectory: Mutex<Vec<JobState>>,
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn save(&self, state: &mut JobState) -> Result<()> {
        state.touch();
        self.states
            .lock()
            .await
            .insert(state.job_id.clone(), state.clone());
        self.trajectory.lock().await.push(state.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobState>> {
        Ok(self.states.lock().await.get(job_id).cloned())
    }

    async fn list(&self) -> Result<Vec<JobState>> {
        Ok(self.states.lock().await.values().cloned().collect())
    }
}

/// FIFO queue over a VecDeque; dequeue never blocks.
#[derive(Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<IndexJob>>,
}

impl MemoryQueue {
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: &IndexJob) -> Result<()> {
        self.items.lock().await.push_back(job.clone());
        Ok(())
    }

    async fn dequeue(&self, _timeout: Duration) -> Result<Option<IndexJob>> {
        Ok(self.items.lock().await.pop_front())
    }

    async fn queued_job_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .items
            .lock()
            .await
            .iter()
            .map(|job| job.job_id.clone())
            .collect())
    }
}

/// Graph store recording every upserted row.
#[derive(Default)]
pub struct MemoryGraphStore {
    pub node_rows: Mutex<Vec<(String, NodeBatchRow)>>,
    pub edge_rows: Mutex<Vec<(String, EdgeBatchRow)>>,
}

impl MemoryGraphStore {
    /// Labels present in the recorded node statements.
    pub async fn node_labels(&self) -> HashSet<String> {
        self.node_rows
            .lock()
            .await
            .iter()
            .map(|(statement, _)| {
                let start = statement.find("(n:`").map_or(0, |idx| idx + 4);
                statement[start..]
                    .split('`')
                    .next()
                    .unwrap_or("")
                    .to_owned()
            })
            .collect()
    }

    /// Relationship types present in the recorded edge statements.
    pub async fn edge_types(&self) -> HashSet<String> {
        self.edge_rows
            .lock()
            .await
            .iter()
            .map(|(statement, _)| {
                let start = statement.find("[r:`").map_or(0, |idx| idx + 4);
                statement[start..]
                    .split('`')
                    .next()
                    .unwrap_or("")
                    .to_owned()
            })
            .collect()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_nodes(
        &self,
        statement: &str,
        rows: Vec<NodeBatchRow>,
    ) -> Result<Vec<NodeBatchResult>> {
        let mut recorded = self.node_rows.lock().await;
        let results = rows
            .iter()
            .map(|row| NodeBatchResult {
                key_hash: row.key_hash.clone(),
                element_id: format!("element:{}", row.key_hash),
            })
            .collect();
        for row in rows {
            recorded.push((statement.to_owned(), row));
        }
        Ok(results)
    }

    async fn upsert_edges(&self, statement: &str, rows: Vec<EdgeBatchRow>) -> Result<()> {
        let mut recorded = self.edge_rows.lock().await;
        for row in rows {
            recorded.push((statement.to_owned(), row));
        }
        Ok(())
    }

    async fn run_statement(&self, _statement: &str) -> Result<()> {
        Ok(())
    }
}

/// Deterministic embeddings derived from the text length.
pub struct StubEmbeddings;

#[async_trait]
impl EmbeddingProvider for StubEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| vec![text.chars().count() as f32, 1.0])
            .collect())
    }

    fn model(&self) -> &str {
        "stub-embedding"
    }

    fn provider_name(&self) -> &str {
        "stub"
    }
}

/// Embedding provider that always fails, for fatal-path tests.
pub struct FailingEmbeddings;

#[async_trait]
impl EmbeddingProvider for FailingEmbeddings {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::embedding("provider unavailable"))
    }

    fn model(&self) -> &str {
        "failing"
    }

    fn provider_name(&self) -> &str {
        "failing"
    }
}

/// Vector index capturing the build call.
#[derive(Default)]
pub struct MemoryVectorIndex {
    pub built: Mutex<Option<(String, Vec<Vec<f32>>, Vec<ChunkRecord>)>>,
}

#[async_trait]
impl VectorIndexProvider for MemoryVectorIndex {
    async fn build_index(
        &self,
        collection: &CollectionId,
        embeddings: Vec<Vec<f32>>,
        records: Vec<ChunkRecord>,
    ) -> Result<()> {
        *self.built.lock().await = Some((collection.to_string(), embeddings, records));
        Ok(())
    }
}

/// Everything a pipeline test needs, wired over the fakes.
pub struct Harness {
    pub job_store: Arc<MemoryJobStore>,
    pub queue: Arc<MemoryQueue>,
    pub graph: Arc<MemoryGraphStore>,
    pub vector_index: Arc<MemoryVectorIndex>,
    pub pipeline: IndexingPipeline,
}

/// Path of the ontology shipped at the repository root.
pub fn shipped_ontology() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../schema/ontology_1c.json")
}

/// Build a pipeline over in-memory fakes and the given ontology.
pub fn harness_with_schema(
    schema_path: &Path,
    embeddings: Arc<dyn EmbeddingProvider>,
) -> Harness {
    let job_store = Arc::new(MemoryJobStore::default());
    let queue = Arc::new(MemoryQueue::default());
    let graph = Arc::new(MemoryGraphStore::default());
    let vector_index = Arc::new(MemoryVectorIndex::default());

    let pipeline = IndexingPipeline::new(
        job_store.clone(),
        GraphWriter::new(graph.clone(), 500, 500, 3, 0.0),
        EmbeddingBatcher::new(embeddings, 64, 2, 0.0),
        vector_index.clone(),
        SchemaValidator::load(schema_path).expect("ontology loads"),
    );

    Harness {
        job_store,
        queue,
        graph,
        vector_index,
        pipeline,
    }
}

/// Harness over the shipped ontology and stub embeddings.
pub fn harness() -> Harness {
    harness_with_schema(&shipped_ontology(), Arc::new(StubEmbeddings))
}
