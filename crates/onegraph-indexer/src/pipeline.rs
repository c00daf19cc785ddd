//! Phase orchestration for one indexing job.
//!
//! Load → Extract/Validate/Merge → Chunk → Embed → GraphWrite →
//! VectorIndex → Finalize, with the job state saved after every
//! observable change. Schema violations abort the job; any other
//! per-document extractor failure is recorded and skipped. `run` never
//! propagates an error: failures transition the job to ERROR with the
//! phase it failed in preserved.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use onegraph_domain::constants::{
    PHASE_EMBEDDING, PHASE_EXTRACTING, PHASE_FINALIZING, PHASE_GRAPH_WRITE, PHASE_VECTOR_INDEX,
};
use onegraph_domain::entities::{
    ChunkRecord, GraphEdge, GraphNode, IndexJob, JobError, JobState, JobStats, JobStatus, NodeKey,
};
use onegraph_domain::error::{Error, Result};
use onegraph_domain::ports::{JobStore, VectorIndexProvider};
use onegraph_domain::CollectionId;

use crate::chunker::chunk_text_units;
use crate::embedding::EmbeddingBatcher;
use crate::extractors::extract_document;
use crate::graph_writer::{GraphWriter, WriteContext, WriteProgress};
use crate::loader::load_documents;
use crate::schema::SchemaValidator;

/// Job state guarded for save-after-change access during a run.
///
/// The pipeline is the only writer of its job while running; the mutex
/// only serialises the orchestrator against the writer callbacks.
pub struct JobTracker {
    store: Arc<dyn JobStore>,
    state: Mutex<JobState>,
}

impl JobTracker {
    /// Wrap a state for tracked mutation.
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, state: JobState) -> Self {
        Self {
            store,
            state: Mutex::new(state),
        }
    }

    /// Apply a mutation and persist the result.
    ///
    /// # Errors
    ///
    /// Returns the job store error when the save fails.
    pub async fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut JobState),
    {
        let mut state = self.state.lock().await;
        mutate(&mut state);
        self.store.save(&mut state).await
    }

    /// Persist the current state unchanged (beyond `updated_at`).
    ///
    /// # Errors
    ///
    /// Returns the job store error when the save fails.
    pub async fn save(&self) -> Result<()> {
        self.update(|_| {}).await
    }

    /// Clone of the current state.
    pub async fn snapshot(&self) -> JobState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl WriteProgress for JobTracker {
    async fn on_nodes_batch(&self, written: usize) -> Result<()> {
        self.update(|state| state.stats.graph_nodes_written += written)
            .await
    }

    async fn on_edges_batch(&self, written: usize) -> Result<()> {
        self.update(|state| state.stats.graph_edges_written += written)
            .await
    }
}

/// The indexing pipeline for one collection-scoped job.
pub struct IndexingPipeline {
    job_store: Arc<dyn JobStore>,
    writer: GraphWriter,
    batcher: EmbeddingBatcher,
    vector_index: Arc<dyn VectorIndexProvider>,
    validator: SchemaValidator,
}

impl IndexingPipeline {
    /// Assemble a pipeline from its collaborators.
    #[must_use]
    pub fn new(
        job_store: Arc<dyn JobStore>,
        writer: GraphWriter,
        batcher: EmbeddingBatcher,
        vector_index: Arc<dyn VectorIndexProvider>,
        validator: SchemaValidator,
    ) -> Self {
        Self {
            job_store,
            writer,
            batcher,
            vector_index,
            validator,
        }
    }

    /// Run one job to completion. Never returns an error: failures are
    /// recorded on the job state instead.
    pub async fn run(&self, job: &IndexJob) {
        info!(
            event = "indexing_start",
            job_id = %job.job_id,
            collection = %job.collection,
        );

        let existing = match self.job_store.get(&job.job_id).await {
            Ok(state) => state,
            Err(err) => {
                error!(
                    event = "job_state_load_failed",
                    job_id = %job.job_id,
                    error = %err,
                );
                None
            }
        };
        let mut state =
            existing.unwrap_or_else(|| JobState::new(job.job_id.clone(), job.collection.clone()));

        state.status = JobStatus::Running;
        state.started_at = Some(Utc::now());
        state.errors.clear();
        // Counters seeded by the upload session survive the reset.
        state.stats = JobStats {
            total_files: state.stats.total_files,
            session_segments: std::mem::take(&mut state.stats.session_segments),
            session_batches: state.stats.session_batches,
            session_total_files: state.stats.session_total_files,
            phase: PHASE_EXTRACTING.to_owned(),
            ..JobStats::default()
        };

        let tracker = JobTracker::new(Arc::clone(&self.job_store), state);
        if let Err(err) = tracker.save().await {
            error!(event = "job_state_save_failed", job_id = %job.job_id, error = %err);
        }

        if let Err(err) = self.execute(job, &tracker).await {
            error!(
                event = "job_failed",
                status = "ERROR",
                job_id = %job.job_id,
                collection = %job.collection,
                error = %err,
            );
            let finished = tracker
                .update(|state| {
                    state.status = JobStatus::Error;
                    state.finished_at = Some(Utc::now());
                    state.errors.push(JobError::job(err.to_string()));
                    state.stats.duration_sec = elapsed_seconds(state);
                })
                .await;
            if let Err(save_err) = finished {
                error!(
                    event = "job_state_save_failed",
                    job_id = %job.job_id,
                    error = %save_err,
                );
            }
        }
    }

    async fn execute(&self, job: &IndexJob, tracker: &JobTracker) -> Result<()> {
        let collection = CollectionId::new(job.collection.clone())?;

        let documents = load_documents(Path::new(&job.raw_path))?;
        info!(
            event = "load_documents_ok",
            job_id = %job.job_id,
            collection = %collection,
            documents = documents.len(),
            path = %job.raw_path,
        );

        let expected_total = tracker.snapshot().await.stats.total_files;
        if expected_total == 0 {
            tracker
                .update(|state| state.stats.total_files = documents.len())
                .await?;
            info!(
                event = "init_total_files",
                job_id = %job.job_id,
                collection = %collection,
                total_files = documents.len(),
            );
        } else if expected_total != documents.len() {
            warn!(
                event = "total_files_mismatch",
                job_id = %job.job_id,
                collection = %collection,
                expected = expected_total,
                actual = documents.len(),
            );
        }

        let mut nodes_by_key: BTreeMap<NodeKey, GraphNode> = BTreeMap::new();
        let mut edges_keyed: BTreeMap<(NodeKey, String, NodeKey), GraphEdge> = BTreeMap::new();
        let mut text_units = Vec::new();

        let mut fatal: Option<Error> = None;
        for document in &documents {
            let outcome = extract_document(document).and_then(|extraction| {
                self.validator.validate(&extraction, &document.rel_path)?;
                Ok(extraction)
            });

            let mut soft_error: Option<JobError> = None;
            match outcome {
                Ok(mut extraction) => {
                    merge_nodes(&mut nodes_by_key, extraction.nodes);
                    tag_edges_with_collection(&mut extraction.edges, &collection);
                    merge_edges(&mut edges_keyed, extraction.edges);
                    text_units.extend(extraction.text_units);
                }
                Err(err @ Error::SchemaValidation { .. }) => {
                    error!(
                        event = "schema_validation_failed",
                        job_id = %job.job_id,
                        collection = %collection,
                        path = %document.rel_path,
                        error = %err,
                    );
                    fatal = Some(err);
                }
                Err(err) => {
                    error!(
                        event = "document_processing_failed",
                        job_id = %job.job_id,
                        collection = %collection,
                        path = %document.rel_path,
                        error = %err,
                    );
                    soft_error = Some(JobError::document(err.to_string(), &document.rel_path));
                }
            }

            tracker
                .update(|state| {
                    if let Some(job_error) = soft_error.take() {
                        state.errors.push(job_error);
                    }
                    state.stats.processed_files += 1;
                })
                .await?;

            let snapshot = tracker.snapshot().await;
            if snapshot.stats.processed_files % 100 == 0 {
                info!(
                    event = "file_progress",
                    job_id = %job.job_id,
                    collection = %collection,
                    processed_files = snapshot.stats.processed_files,
                    total_files = snapshot.stats.total_files,
                );
            }

            if let Some(err) = fatal.take() {
                return Err(err);
            }
        }

        let soft_errors = tracker.snapshot().await.errors.len();
        if soft_errors > 0 {
            warn!(
                event = "job_completed_with_errors",
                job_id = %job.job_id,
                collection = %collection,
                errors = soft_errors,
            );
        }

        let chunks = chunk_text_units(&text_units);
        if chunks.is_empty() {
            warn!(event = "no_chunks", job_id = %job.job_id, collection = %collection);
        } else {
            info!(
                event = "chunks_generated",
                job_id = %job.job_id,
                collection = %collection,
                chunks = chunks.len(),
            );
        }
        tracker
            .update(|state| {
                state.stats.vector_chunks = chunks.len();
                state.stats.phase = PHASE_EMBEDDING.to_owned();
                state.stats.embedded_chunks = 0;
            })
            .await?;
        info!(
            event = "phase_set",
            job_id = %job.job_id,
            collection = %collection,
            phase = PHASE_EMBEDDING,
            vector_chunks = chunks.len(),
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in self.batcher.batches(&texts) {
            let batch_vectors = self.batcher.embed_batch(batch).await?;
            let written = batch_vectors.len();
            vectors.extend(batch_vectors);
            tracker
                .update(|state| state.stats.embedded_chunks += written)
                .await?;
            let snapshot = tracker.snapshot().await;
            info!(
                event = "embedding_progress",
                job_id = %job.job_id,
                collection = %collection,
                embedded_chunks = snapshot.stats.embedded_chunks,
                vector_chunks = snapshot.stats.vector_chunks,
            );
        }
        if !vectors.is_empty() {
            info!(
                event = "embeddings_computed",
                job_id = %job.job_id,
                collection = %collection,
                embedded = vectors.len(),
            );
        }

        let nodes: Vec<GraphNode> = nodes_by_key.into_values().collect();
        let edges: Vec<GraphEdge> = edges_keyed.into_values().collect();
        tracker
            .update(|state| {
                state.stats.graph_nodes_total = nodes.len();
                state.stats.graph_edges_total = edges.len();
                state.stats.graph_nodes_written = 0;
                state.stats.graph_edges_written = 0;
                state.stats.phase = PHASE_GRAPH_WRITE.to_owned();
            })
            .await?;
        info!(
            event = "phase_set",
            job_id = %job.job_id,
            collection = %collection,
            phase = PHASE_GRAPH_WRITE,
            graph_nodes_total = nodes.len(),
            graph_edges_total = edges.len(),
        );

        let context = WriteContext {
            job_id: job.job_id.clone(),
            collection: collection.to_string(),
        };
        let node_map = self.writer.upsert(&nodes, &edges, &context, tracker).await?;

        tracker
            .update(|state| {
                state.stats.graph_nodes_written = state.stats.graph_nodes_total;
                state.stats.graph_edges_written = state.stats.graph_edges_total;
                state.stats.nodes = nodes.len();
                state.stats.edges = edges.len();
            })
            .await?;
        info!(
            event = "graph_write_completed",
            job_id = %job.job_id,
            collection = %collection,
            graph_nodes_written = nodes.len(),
            graph_edges_written = edges.len(),
        );

        tracker
            .update(|state| state.stats.phase = PHASE_VECTOR_INDEX.to_owned())
            .await?;
        info!(
            event = "phase_set",
            job_id = %job.job_id,
            collection = %collection,
            phase = PHASE_VECTOR_INDEX,
        );
        if !chunks.is_empty() && !vectors.is_empty() {
            let records: Vec<ChunkRecord> = chunks
                .iter()
                .map(|chunk| ChunkRecord::new(chunk, node_map.get(&chunk.node_key).cloned()))
                .collect();
            self.vector_index
                .build_index(&collection, vectors, records)
                .await?;
            info!(
                event = "vector_index_updated",
                job_id = %job.job_id,
                collection = %collection,
            );
        }

        tracker
            .update(|state| state.stats.phase = PHASE_FINALIZING.to_owned())
            .await?;
        info!(
            event = "phase_set",
            job_id = %job.job_id,
            collection = %collection,
            phase = PHASE_FINALIZING,
        );

        tracker
            .update(|state| {
                state.status = JobStatus::Done;
                state.finished_at = Some(Utc::now());
                state.stats.duration_sec = elapsed_seconds(state);
            })
            .await?;
        let snapshot = tracker.snapshot().await;
        info!(
            event = "job_finished",
            status = "DONE",
            job_id = %job.job_id,
            collection = %collection,
            duration_sec = snapshot.stats.duration_sec,
        );
        Ok(())
    }
}

fn elapsed_seconds(state: &JobState) -> f64 {
    match (state.started_at, state.finished_at) {
        (Some(started), Some(finished)) => {
            (finished - started).num_milliseconds() as f64 / 1000.0
        }
        _ => 0.0,
    }
}

/// Merge nodes into the accumulator: last writer wins per non-null
/// property, keyed by [`NodeKey`].
fn merge_nodes(accumulator: &mut BTreeMap<NodeKey, GraphNode>, nodes: Vec<GraphNode>) {
    for node in nodes {
        let key = node.node_key();
        match accumulator.get_mut(&key) {
            Some(existing) => existing.merge_from(node),
            None => {
                accumulator.insert(key, node);
            }
        }
    }
}

/// Merge edges into the accumulator: the first occurrence of a
/// `(start, type, end)` triple wins.
fn merge_edges(
    accumulator: &mut BTreeMap<(NodeKey, String, NodeKey), GraphEdge>,
    edges: Vec<GraphEdge>,
) {
    for edge in edges {
        accumulator.entry(edge.identity()).or_insert(edge);
    }
}

/// Every edge of a job carries its collection for scoped retrieval.
fn tag_edges_with_collection(edges: &mut [GraphEdge], collection: &CollectionId) {
    for edge in edges.iter_mut() {
        edge.properties
            .insert("collection".to_owned(), json!(collection.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::BTreeMap as Map;

    fn node(label: &str, key_value: &str, props: Vec<(&str, Value)>) -> GraphNode {
        let mut key = Map::new();
        key.insert("guid".to_owned(), key_value.to_owned());
        GraphNode::new(
            label,
            key,
            props
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value))
                .collect(),
        )
    }

    #[test]
    fn merge_nodes_is_last_writer_wins_on_non_null() {
        let mut accumulator = BTreeMap::new();
        merge_nodes(
            &mut accumulator,
            vec![node("Module", "g", vec![("name", json!("a")), ("kind", json!("x"))])],
        );
        merge_nodes(
            &mut accumulator,
            vec![node("Module", "g", vec![("name", json!("b")), ("kind", Value::Null)])],
        );
        let merged = accumulator.values().next().unwrap();
        assert_eq!(merged.properties["name"], json!("b"));
        assert_eq!(merged.properties["kind"], json!("x"));
    }

    #[test]
    fn merge_edges_is_first_writer_wins() {
        let a = node("Module", "g1", vec![]);
        let b = node("Routine", "g2", vec![]);
        let mut first = GraphEdge::new(a.node_key(), "HAS_ROUTINE", b.node_key());
        first.properties.insert("collection".to_owned(), json!("one"));
        let mut second = GraphEdge::new(a.node_key(), "HAS_ROUTINE", b.node_key());
        second.properties.insert("collection".to_owned(), json!("two"));

        let mut accumulator = BTreeMap::new();
        merge_edges(&mut accumulator, vec![first, second]);
        assert_eq!(accumulator.len(), 1);
        let kept = accumulator.values().next().unwrap();
        assert_eq!(kept.properties["collection"], json!("one"));
    }

    #[test]
    fn edges_are_tagged_with_the_collection() {
        let a = node("Module", "g1", vec![]);
        let b = node("Routine", "g2", vec![]);
        let mut edges = vec![GraphEdge::new(a.node_key(), "HAS_ROUTINE", b.node_key())];
        tag_edges_with_collection(&mut edges, &CollectionId::new("erp").unwrap());
        assert_eq!(edges[0].properties["collection"], json!("erp"));
    }
}
