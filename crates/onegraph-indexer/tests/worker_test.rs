//! Worker startup recovery over in-memory fakes.

mod support;

use std::sync::Arc;
use std::time::Duration;

use onegraph_domain::entities::{IndexJob, JobState, JobStatus};
use onegraph_domain::ports::{JobQueue as _, JobStore as _};
use onegraph_indexer::Worker;
use support::harness;

async fn seeded_state(
    store: &support::MemoryJobStore,
    job_id: &str,
    collection: &str,
    status: JobStatus,
) {
    let mut state = JobState::new(job_id, collection);
    state.status = status;
    state.started_at = Some(chrono::Utc::now());
    store.save(&mut state).await.unwrap();
}

#[tokio::test]
async fn running_state_with_raw_dir_is_requeued_once() {
    let workspace = tempfile::tempdir().unwrap();
    let h = harness();
    let pipeline = Arc::new(h.pipeline);

    std::fs::create_dir_all(workspace.path().join("erp/job-a/raw")).unwrap();
    seeded_state(&h.job_store, "job-a", "erp", JobStatus::Running).await;

    let worker = Worker::new(
        h.queue.clone(),
        h.job_store.clone(),
        pipeline,
        workspace.path().to_path_buf(),
    );
    worker.recover().await.unwrap();

    assert_eq!(h.queue.len().await, 1);
    let job = h.queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(job.job_id, "job-a");
    assert!(job.raw_path.ends_with("erp/job-a/raw"));

    let state = h.job_store.get("job-a").await.unwrap().unwrap();
    assert_eq!(state.status, JobStatus::Pending);
    assert!(state.started_at.is_none());
    assert!(state.finished_at.is_none());
}

#[tokio::test]
async fn already_queued_job_is_not_duplicated() {
    let workspace = tempfile::tempdir().unwrap();
    let h = harness();
    let pipeline = Arc::new(h.pipeline);

    std::fs::create_dir_all(workspace.path().join("erp/job-b/raw")).unwrap();
    seeded_state(&h.job_store, "job-b", "erp", JobStatus::Pending).await;
    h.queue
        .enqueue(&IndexJob {
            job_id: "job-b".to_owned(),
            collection: "erp".to_owned(),
            raw_path: workspace
                .path()
                .join("erp/job-b/raw")
                .to_string_lossy()
                .into_owned(),
        })
        .await
        .unwrap();

    let worker = Worker::new(
        h.queue.clone(),
        h.job_store.clone(),
        pipeline,
        workspace.path().to_path_buf(),
    );
    worker.recover().await.unwrap();

    assert_eq!(h.queue.len().await, 1);
}

#[tokio::test]
async fn missing_raw_dir_leaves_the_job_orphaned() {
    let workspace = tempfile::tempdir().unwrap();
    let h = harness();
    let pipeline = Arc::new(h.pipeline);

    seeded_state(&h.job_store, "job-c", "erp", JobStatus::Running).await;

    let worker = Worker::new(
        h.queue.clone(),
        h.job_store.clone(),
        pipeline,
        workspace.path().to_path_buf(),
    );
    worker.recover().await.unwrap();

    assert_eq!(h.queue.len().await, 0);
    // State is untouched, merely logged.
    let state = h.job_store.get("job-c").await.unwrap().unwrap();
    assert_eq!(state.status, JobStatus::Running);
}

#[tokio::test]
async fn finished_states_are_not_recovered() {
    let workspace = tempfile::tempdir().unwrap();
    let h = harness();
    let pipeline = Arc::new(h.pipeline);

    std::fs::create_dir_all(workspace.path().join("erp/job-d/raw")).unwrap();
    seeded_state(&h.job_store, "job-d", "erp", JobStatus::Done).await;
    std::fs::create_dir_all(workspace.path().join("erp/job-e/raw")).unwrap();
    seeded_state(&h.job_store, "job-e", "erp", JobStatus::Error).await;

    let worker = Worker::new(
        h.queue.clone(),
        h.job_store.clone(),
        pipeline,
        workspace.path().to_path_buf(),
    );
    worker.recover().await.unwrap();

    assert_eq!(h.queue.len().await, 0);
}
