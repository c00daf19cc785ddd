//! Shared defaults and fixed tables.

/// File extensions admitted by the loader and the upload protocol.
pub const ALLOWED_EXTENSIONS: [&str; 5] = [".bsl", ".xml", ".html", ".htm", ".txt"];

/// Whether a lowercase extension (with leading dot) is admitted.
#[must_use]
pub fn is_allowed_extension(ext: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&ext)
}

/// Pipeline phase: per-document extraction, validation and merging.
pub const PHASE_EXTRACTING: &str = "EXTRACTING";
/// Pipeline phase: batched embedding computation.
pub const PHASE_EMBEDDING: &str = "EMBEDDING";
/// Pipeline phase: batched graph upserts.
pub const PHASE_GRAPH_WRITE: &str = "GRAPH_WRITE";
/// Pipeline phase: vector index build and persistence.
pub const PHASE_VECTOR_INDEX: &str = "VECTOR_INDEX";
/// Pipeline phase: final bookkeeping before the job is marked DONE.
pub const PHASE_FINALIZING: &str = "FINALIZING";

/// Default Redis list the indexing jobs are queued on.
pub const DEFAULT_INDEX_QUEUE_NAME: &str = "onegraph:indexer:queue";
/// Default Redis key prefix for persisted job states.
pub const DEFAULT_JOB_STATE_PREFIX: &str = "onegraph:indexer:jobs";

/// Default directory name for upload sessions under the workspace root.
pub const DEFAULT_UPLOAD_SESSION_DIRNAME: &str = ".upload_sessions";
/// Default maximum number of files per upload part.
pub const DEFAULT_UPLOAD_SESSION_BATCH_SIZE: usize = 100;

/// Default number of texts per embedding API call.
pub const DEFAULT_MAX_EMBEDDING_BATCH: usize = 64;
/// Default retry attempts per embedding batch.
pub const DEFAULT_EMBEDDING_RETRY_ATTEMPTS: usize = 5;
/// Default linear backoff factor (seconds) between embedding retries.
pub const DEFAULT_EMBEDDING_RETRY_BACKOFF: f64 = 2.0;

/// Default node rows per graph upsert batch.
pub const DEFAULT_NEO4J_NODE_BATCH_SIZE: usize = 500;
/// Default edge rows per graph upsert batch.
pub const DEFAULT_NEO4J_EDGE_BATCH_SIZE: usize = 500;
/// Default attempts per graph write batch.
pub const DEFAULT_NEO4J_WRITE_MAX_ATTEMPTS: usize = 3;
/// Default fixed backoff (seconds) between graph write attempts.
pub const DEFAULT_NEO4J_WRITE_BACKOFF_SEC: f64 = 1.0;

/// Default vector index binary filename.
pub const DEFAULT_FAISS_INDEX_FILENAME: &str = "index.faiss";
/// Default vector index metadata sidecar filename.
pub const DEFAULT_FAISS_METADATA_FILENAME: &str = "chunks.jsonl";

/// Chunker target size in tokens.
pub const CHUNK_TARGET_TOKENS: usize = 800;
/// Chunker overlap in tokens.
pub const CHUNK_OVERLAP_TOKENS: usize = 120;
/// Fixed characters-per-token ratio used by the chunker.
pub const CHARS_PER_TOKEN: usize = 4;

/// Length of the snippet stored in the vector index sidecar.
pub const TEXT_SNIPPET_LEN: usize = 300;
