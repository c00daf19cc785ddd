//! Durable job state and queue ports.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::entities::{IndexJob, JobState};
use crate::error::Result;

/// Durable key-value store of [`JobState`] records.
///
/// Writes are last-writer-wins; callers never read-modify-write the same
/// job concurrently. The API writes a job once at creation, the owning
/// worker writes every change afterwards.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a state, bumping `updated_at` so it strictly increases.
    async fn save(&self, state: &mut JobState) -> Result<()>;

    /// Fetch a state by job id; `None` on miss.
    async fn get(&self, job_id: &str) -> Result<Option<JobState>>;

    /// Scan every known state (startup recovery, listings).
    async fn list(&self) -> Result<Vec<JobState>>;
}

/// Durable FIFO of [`IndexJob`] records.
///
/// The sole coordination point between the upload path (producer) and
/// workers (consumers); a job is dequeued exactly once per attempt.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Push a job onto the tail of the queue.
    async fn enqueue(&self, job: &IndexJob) -> Result<()>;

    /// Blocking-pop from the head, waiting at most `timeout`.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<IndexJob>>;

    /// Ids of all currently queued jobs (recovery dedup).
    async fn queued_job_ids(&self) -> Result<HashSet<String>>;
}
