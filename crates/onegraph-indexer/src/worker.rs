//! Dequeuing worker loop with startup recovery.
//!
//! One consumer per process: dequeue with a bounded wait, run the
//! pipeline, repeat. On startup every PENDING/RUNNING state that is not
//! already queued and whose raw directory still exists is reset to
//! PENDING and re-enqueued exactly once; states whose raw directory is
//! gone are logged and left orphaned. The stop flag set by
//! SIGTERM/SIGINT is honoured at the top of each iteration; an in-flight
//! pipeline runs to completion.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{error, info, warn};

use onegraph_domain::entities::{IndexJob, JobStatus};
use onegraph_domain::error::Result;
use onegraph_domain::ports::{JobQueue, JobStore};

use crate::pipeline::IndexingPipeline;

/// Seconds a dequeue blocks before reporting an empty queue.
const DEQUEUE_TIMEOUT_SECS: u64 = 5;
/// Idle sleep between empty dequeues.
const IDLE_SLEEP_SECS: u64 = 1;

/// Single-consumer indexing worker.
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    job_store: Arc<dyn JobStore>,
    pipeline: Arc<IndexingPipeline>,
    workspace_dir: PathBuf,
    stop: Arc<AtomicBool>,
}

impl Worker {
    /// Assemble a worker over its queue, store and pipeline.
    #[must_use]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        job_store: Arc<dyn JobStore>,
        pipeline: Arc<IndexingPipeline>,
        workspace_dir: PathBuf,
    ) -> Self {
        Self {
            queue,
            job_store,
            pipeline,
            workspace_dir,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared stop flag; set it from a signal handler to end the loop.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run until the stop flag is set.
    pub async fn run(&self) {
        info!(event = "worker_started", service = "indexer");

        if let Err(err) = self.recover().await {
            error!(event = "recovery_failed", error = %err);
        }

        while !self.stop.load(Ordering::Relaxed) {
            match self
                .queue
                .dequeue(Duration::from_secs(DEQUEUE_TIMEOUT_SECS))
                .await
            {
                Ok(Some(job)) => {
                    info!(
                        event = "job_dequeued",
                        job_id = %job.job_id,
                        collection = %job.collection,
                    );
                    self.pipeline.run(&job).await;
                }
                Ok(None) => {
                    tokio::time::sleep(Duration::from_secs(IDLE_SLEEP_SECS)).await;
                }
                Err(err) => {
                    error!(event = "dequeue_failed", error = %err);
                    tokio::time::sleep(Duration::from_secs(IDLE_SLEEP_SECS)).await;
                }
            }
        }

        info!(event = "worker_stopped", service = "indexer");
    }

    /// Re-enqueue interrupted jobs left over from a previous process.
    ///
    /// # Errors
    ///
    /// Returns an error when the queue or store cannot be read at all;
    /// per-job failures are logged and skipped.
    pub async fn recover(&self) -> Result<()> {
        let queued = self.queue.queued_job_ids().await?;
        let states = self.job_store.list().await?;

        for mut state in states {
            if !matches!(state.status, JobStatus::Pending | JobStatus::Running) {
                continue;
            }
            if queued.contains(&state.job_id) {
                continue;
            }
            let raw_path = self
                .workspace_dir
                .join(&state.collection)
                .join(&state.job_id)
                .join("raw");
            if !raw_path.is_dir() {
                warn!(
                    event = "job_orphaned",
                    job_id = %state.job_id,
                    collection = %state.collection,
                    raw_path = %raw_path.display(),
                );
                continue;
            }

            state.status = JobStatus::Pending;
            state.started_at = None;
            state.finished_at = None;
            if let Err(err) = self.job_store.save(&mut state).await {
                error!(event = "recovery_save_failed", job_id = %state.job_id, error = %err);
                continue;
            }
            let job = IndexJob {
                job_id: state.job_id.clone(),
                collection: state.collection.clone(),
                raw_path: raw_path.to_string_lossy().into_owned(),
            };
            if let Err(err) = self.queue.enqueue(&job).await {
                error!(event = "recovery_enqueue_failed", job_id = %state.job_id, error = %err);
                continue;
            }
            info!(
                event = "job_recovered",
                job_id = %state.job_id,
                collection = %state.collection,
            );
        }
        Ok(())
    }
}
