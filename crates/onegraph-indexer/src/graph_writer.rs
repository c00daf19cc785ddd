//! Chunked idempotent merge of nodes and edges into the graph store.
//!
//! Nodes are grouped by label and edges by `(start label, type, end
//! label)`; every group must expose a uniform set of key fields. Each
//! batch executes as a single transaction and is retried on transient
//! backend errors with a fixed backoff. Null-valued properties are
//! stripped before upsert so they never overwrite existing values.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info};

use onegraph_domain::entities::{GraphEdge, GraphNode, NodeKey};
use onegraph_domain::error::{Error, Result};
use onegraph_domain::ports::{EdgeBatchRow, GraphStore, NodeBatchRow};

/// Job identity attached to every batch log event.
#[derive(Debug, Clone)]
pub struct WriteContext {
    /// Job the write belongs to.
    pub job_id: String,
    /// Collection the write belongs to.
    pub collection: String,
}

/// Progress callbacks invoked after each successful batch.
#[async_trait]
pub trait WriteProgress: Send + Sync {
    /// A node batch of `written` rows was committed.
    async fn on_nodes_batch(&self, written: usize) -> Result<()>;
    /// An edge batch of `written` rows was committed.
    async fn on_edges_batch(&self, written: usize) -> Result<()>;
}

/// Progress sink that ignores all callbacks.
pub struct NoProgress;

#[async_trait]
impl WriteProgress for NoProgress {
    async fn on_nodes_batch(&self, _written: usize) -> Result<()> {
        Ok(())
    }
    async fn on_edges_batch(&self, _written: usize) -> Result<()> {
        Ok(())
    }
}

/// Batched, retrying writer over a [`GraphStore`].
pub struct GraphWriter {
    store: std::sync::Arc<dyn GraphStore>,
    node_batch_size: usize,
    edge_batch_size: usize,
    max_attempts: usize,
    backoff_sec: f64,
}

impl GraphWriter {
    /// Create a writer with explicit batch and retry parameters.
    #[must_use]
    pub fn new(
        store: std::sync::Arc<dyn GraphStore>,
        node_batch_size: usize,
        edge_batch_size: usize,
        max_attempts: usize,
        backoff_sec: f64,
    ) -> Self {
        Self {
            store,
            node_batch_size: node_batch_size.max(1),
            edge_batch_size: edge_batch_size.max(1),
            max_attempts: max_attempts.max(1),
            backoff_sec,
        }
    }

    /// Upsert all nodes, then all edges, returning the node id map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataModel`] for inconsistent key fields and the
    /// backend error once batch retries are exhausted.
    pub async fn upsert(
        &self,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
        context: &WriteContext,
        progress: &dyn WriteProgress,
    ) -> Result<HashMap<NodeKey, String>> {
        let mut node_map: HashMap<NodeKey, String> = HashMap::new();

        for (label, bucket) in group_nodes(nodes) {
            let key_fields = derive_node_key_fields(&label, &bucket)?;
            let statement = build_merge_node_statement(&label, &key_fields);

            for (batch_index, batch) in bucket.chunks(self.node_batch_size).enumerate() {
                let batch_index = batch_index + 1;
                let (rows, lookup) = build_node_rows(batch);
                info!(
                    event = "neo4j_nodes_batch_start",
                    job_id = %context.job_id,
                    collection = %context.collection,
                    label = %label,
                    batch_index,
                    batch_size = rows.len(),
                );
                let started = Instant::now();

                let mut attempt = 1;
                let results = loop {
                    match self.store.upsert_nodes(&statement, rows.clone()).await {
                        Ok(results) => break results,
                        Err(err) => {
                            self.log_batch_failure(
                                context, "nodes", batch_index, rows.len(), attempt, &err,
                            );
                            if !err.is_transient() || attempt >= self.max_attempts {
                                return Err(err);
                            }
                            self.sleep_backoff().await;
                            attempt += 1;
                        }
                    }
                };

                for row in results {
                    let Some(node_key) = lookup.get(&row.key_hash) else {
                        return Err(Error::data_model(format!(
                            "missing node lookup for key_hash={}",
                            row.key_hash
                        )));
                    };
                    node_map.insert(node_key.clone(), row.element_id);
                }
                info!(
                    event = "neo4j_nodes_batch_end",
                    job_id = %context.job_id,
                    collection = %context.collection,
                    label = %label,
                    batch_index,
                    batch_size = rows.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                );
                progress.on_nodes_batch(rows.len()).await?;
            }
        }

        for ((start_label, rel_type, end_label), bucket) in group_edges(edges) {
            let (start_fields, end_fields) = derive_edge_fields(&rel_type, &bucket)?;
            let statement = build_merge_edge_statement(
                &start_label,
                &rel_type,
                &end_label,
                &start_fields,
                &end_fields,
            );

            for (batch_index, batch) in bucket.chunks(self.edge_batch_size).enumerate() {
                let batch_index = batch_index + 1;
                let rows: Vec<EdgeBatchRow> = batch
                    .iter()
                    .map(|edge| EdgeBatchRow {
                        start: edge.start.to_map(),
                        end: edge.end.to_map(),
                        props: strip_nulls(&edge.properties),
                    })
                    .collect();
                info!(
                    event = "neo4j_edges_batch_start",
                    job_id = %context.job_id,
                    collection = %context.collection,
                    rel_type = %rel_type,
                    start_label = %start_label,
                    end_label = %end_label,
                    batch_index,
                    batch_size = rows.len(),
                );
                let started = Instant::now();

                let mut attempt = 1;
                loop {
                    match self.store.upsert_edges(&statement, rows.clone()).await {
                        Ok(()) => break,
                        Err(err) => {
                            self.log_batch_failure(
                                context, "edges", batch_index, rows.len(), attempt, &err,
                            );
                            if !err.is_transient() || attempt >= self.max_attempts {
                                return Err(err);
                            }
                            self.sleep_backoff().await;
                            attempt += 1;
                        }
                    }
                }
                info!(
                    event = "neo4j_edges_batch_end",
                    job_id = %context.job_id,
                    collection = %context.collection,
                    rel_type = %rel_type,
                    start_label = %start_label,
                    end_label = %end_label,
                    batch_index,
                    batch_size = rows.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                );
                progress.on_edges_batch(rows.len()).await?;
            }
        }

        Ok(node_map)
    }

    fn log_batch_failure(
        &self,
        context: &WriteContext,
        batch_kind: &str,
        batch_index: usize,
        batch_size: usize,
        attempt: usize,
        err: &Error,
    ) {
        error!(
            event = "neo4j_batch_failed",
            job_id = %context.job_id,
            collection = %context.collection,
            batch_kind,
            batch_index,
            batch_size,
            attempt,
            max_attempts = self.max_attempts,
            error = %err,
        );
    }

    async fn sleep_backoff(&self) {
        if self.backoff_sec > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(self.backoff_sec)).await;
        }
    }
}

/// Group nodes by label, preserving first-seen label order.
fn group_nodes(nodes: &[GraphNode]) -> Vec<(String, Vec<&GraphNode>)> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<&GraphNode>> = HashMap::new();
    for node in nodes {
        if !buckets.contains_key(&node.label) {
            order.push(node.label.clone());
        }
        buckets.entry(node.label.clone()).or_default().push(node);
    }
    order
        .into_iter()
        .map(|label| {
            let bucket = buckets.remove(&label).unwrap_or_default();
            (label, bucket)
        })
        .collect()
}

/// Group edges by `(start label, type, end label)`, preserving order.
fn group_edges(edges: &[GraphEdge]) -> Vec<((String, String, String), Vec<&GraphEdge>)> {
    let mut order: Vec<(String, String, String)> = Vec::new();
    let mut buckets: HashMap<(String, String, String), Vec<&GraphEdge>> = HashMap::new();
    for edge in edges {
        let group = (
            edge.start.label.clone(),
            edge.rel_type.clone(),
            edge.end.label.clone(),
        );
        if !buckets.contains_key(&group) {
            order.push(group.clone());
        }
        buckets.entry(group).or_default().push(edge);
    }
    order
        .into_iter()
        .map(|group| {
            let bucket = buckets.remove(&group).unwrap_or_default();
            (group, bucket)
        })
        .collect()
}

fn derive_node_key_fields(label: &str, bucket: &[&GraphNode]) -> Result<Vec<String>> {
    let first: Vec<String> = bucket[0].key.keys().cloned().collect();
    for node in &bucket[1..] {
        let other: Vec<String> = node.key.keys().cloned().collect();
        if other != first {
            return Err(Error::data_model(format!(
                "inconsistent key fields for label={label}: {first:?} vs {other:?}"
            )));
        }
    }
    Ok(first)
}

fn derive_edge_fields(
    rel_type: &str,
    bucket: &[&GraphEdge],
) -> Result<(Vec<String>, Vec<String>)> {
    let field_names = |key: &NodeKey| -> Vec<String> {
        key.key.iter().map(|(name, _)| name.clone()).collect()
    };
    let start_fields = field_names(&bucket[0].start);
    let end_fields = field_names(&bucket[0].end);
    for edge in &bucket[1..] {
        if field_names(&edge.start) != start_fields {
            return Err(Error::data_model(format!(
                "inconsistent start node keys for relationship {rel_type}: {start_fields:?} vs {:?}",
                field_names(&edge.start)
            )));
        }
        if field_names(&edge.end) != end_fields {
            return Err(Error::data_model(format!(
                "inconsistent end node keys for relationship {rel_type}: {end_fields:?} vs {:?}",
                field_names(&edge.end)
            )));
        }
    }
    Ok((start_fields, end_fields))
}

fn build_node_rows(batch: &[&GraphNode]) -> (Vec<NodeBatchRow>, HashMap<String, NodeKey>) {
    let mut rows = Vec::with_capacity(batch.len());
    let mut lookup = HashMap::with_capacity(batch.len());
    for node in batch {
        let node_key = node.node_key();
        let key_hash = node_key.key_hash();
        rows.push(NodeBatchRow {
            key: node.key.clone(),
            props: strip_nulls(&node.properties),
            key_hash: key_hash.clone(),
        });
        lookup.insert(key_hash, node_key);
    }
    (rows, lookup)
}

fn strip_nulls(properties: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    properties
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn build_merge_node_statement(label: &str, key_fields: &[String]) -> String {
    let key_clause = key_fields
        .iter()
        .map(|field| format!("{field}: row.key.{field}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UNWIND $nodes AS row \
         MERGE (n:`{label}` {{ {key_clause} }}) \
         SET n += row.props \
         RETURN row.key_hash AS key_hash, elementId(n) AS element_id"
    )
}

fn build_merge_edge_statement(
    start_label: &str,
    rel_type: &str,
    end_label: &str,
    start_fields: &[String],
    end_fields: &[String],
) -> String {
    let clause = |scope: &str, fields: &[String]| {
        fields
            .iter()
            .map(|field| format!("{field}: edge.{scope}.{field}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "UNWIND $edges AS edge \
         MATCH (s:`{start_label}` {{ {} }}) \
         MATCH (e:`{end_label}` {{ {} }}) \
         MERGE (s)-[r:`{rel_type}`]->(e) \
         SET r += edge.props",
        clause("start", start_fields),
        clause("end", end_fields)
    )
}
