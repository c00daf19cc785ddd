//! Core business entities.

/// Text chunks and vector sidecar rows.
pub mod chunk;
/// Property-graph nodes, edges and text units.
pub mod graph;
/// Indexing job state and queue records.
pub mod job;
/// Upload session metadata.
pub mod upload;

pub use chunk::{Chunk, ChunkRecord, snippet};
pub use graph::{ExtractionResult, GraphEdge, GraphNode, NodeKey, TextUnit};
pub use job::{IndexJob, JobError, JobState, JobStats, JobStatus};
pub use upload::{SessionMeta, SessionStatus};
