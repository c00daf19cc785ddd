//! Indexing job state and queue records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an indexing job.
///
/// Advances monotonically `PENDING → RUNNING → {DONE, ERROR}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Queued, not yet picked up by a worker.
    Pending,
    /// Owned by a worker, pipeline in progress.
    Running,
    /// Completed, possibly with soft per-document errors.
    Done,
    /// Aborted by a fatal error.
    Error,
}

/// Progress counters published after every observable state change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    /// Current pipeline phase.
    #[serde(default)]
    pub phase: String,
    /// Expected number of documents, seeded by the upload session.
    #[serde(default)]
    pub total_files: usize,
    /// Documents extracted so far (including failed ones).
    #[serde(default)]
    pub processed_files: usize,
    /// Distinct merged nodes.
    #[serde(default)]
    pub nodes: usize,
    /// Distinct merged edges.
    #[serde(default)]
    pub edges: usize,
    /// Chunks produced by the chunker.
    #[serde(default)]
    pub vector_chunks: usize,
    /// Chunks embedded so far. Never exceeds `vector_chunks`.
    #[serde(default)]
    pub embedded_chunks: usize,
    /// Node rows the graph writer will upsert.
    #[serde(default)]
    pub graph_nodes_total: usize,
    /// Node rows upserted so far.
    #[serde(default)]
    pub graph_nodes_written: usize,
    /// Edge rows the graph writer will upsert.
    #[serde(default)]
    pub graph_edges_total: usize,
    /// Edge rows upserted so far.
    #[serde(default)]
    pub graph_edges_written: usize,
    /// Wall-clock duration of the job in seconds, set at finalisation.
    #[serde(default)]
    pub duration_sec: f64,
    /// Files per upload part, recorded at session completion.
    #[serde(default)]
    pub session_segments: Vec<usize>,
    /// Number of upload parts.
    #[serde(default)]
    pub session_batches: usize,
    /// Files moved out of the upload session.
    #[serde(default)]
    pub session_total_files: usize,
}

/// A recorded job error, soft or fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    /// Human-readable error description.
    pub message: String,
    /// Offending document path for per-document failures.
    #[serde(default)]
    pub path: Option<String>,
}

impl JobError {
    /// A job-level error with no document path.
    #[must_use]
    pub fn job(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    /// A per-document error.
    #[must_use]
    pub fn document(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

/// Durable state of one indexing job, persisted after every change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    /// Unique job identifier (32 hex chars).
    pub job_id: String,
    /// Collection the job indexes into.
    pub collection: String,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Progress counters.
    #[serde(default)]
    pub stats: JobStats,
    /// Soft and fatal errors recorded so far.
    #[serde(default)]
    pub errors: Vec<JobError>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last save time; strictly increases on every save.
    pub updated_at: DateTime<Utc>,
    /// Time the worker picked the job up.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Time the job reached DONE or ERROR.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobState {
    /// Fresh PENDING state for a newly created job.
    #[must_use]
    pub fn new(job_id: impl Into<String>, collection: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            collection: collection.into(),
            status: JobStatus::Pending,
            stats: JobStats::default(),
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Advance `updated_at`, keeping it strictly increasing even when two
    /// saves land within clock resolution.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
    }
}

/// Queue record handed from the upload path to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexJob {
    /// Job identifier, matches the persisted [`JobState`].
    pub job_id: String,
    /// Target collection.
    pub collection: String,
    /// Absolute path of the raw corpus directory.
    pub raw_path: String,
}
